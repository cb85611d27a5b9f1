//! Image decoding and thumbnail synthesis.
//!
//! Both operations are CPU-bound and synchronous; callers run them on the blocking pool.

use anyhow::Context;
use cairn_core::models::{ImageProperties, Thumbnail};
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/png";

/// Image facts recovered by decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub color_depth: u16,
    pub has_alpha: bool,
}

impl From<ImageInfo> for ImageProperties {
    fn from(info: ImageInfo) -> Self {
        ImageProperties {
            width: Some(info.width),
            height: Some(info.height),
            color_depth: Some(info.color_depth),
            has_alpha: Some(info.has_alpha),
        }
    }
}

pub trait ThumbnailGenerator: Send + Sync {
    fn dimensions(&self, data: &[u8]) -> anyhow::Result<ImageInfo>;

    fn thumbnail(&self, data: &[u8]) -> anyhow::Result<Thumbnail>;

    /// Dimensions plus an optional thumbnail. The default calls both methods above;
    /// decoding implementations override it to decode once.
    fn analyze(
        &self,
        data: &[u8],
        with_thumbnail: bool,
    ) -> anyhow::Result<(ImageInfo, Option<Thumbnail>)> {
        let info = self.dimensions(data)?;
        let thumbnail = if with_thumbnail {
            Some(self.thumbnail(data)?)
        } else {
            None
        };
        Ok((info, thumbnail))
    }
}

/// Thumbnails fitted inside a square box, encoded as PNG.
pub struct ImageThumbnailer {
    max_dimension: u32,
}

impl ImageThumbnailer {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    fn decode(data: &[u8]) -> anyhow::Result<DynamicImage> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("Failed to detect image format")?;
        reader.decode().context("Failed to decode image")
    }

    fn info_of(img: &DynamicImage) -> ImageInfo {
        let (width, height) = img.dimensions();
        let color = img.color();
        let channels = u16::from(color.channel_count().max(1));

        ImageInfo {
            width,
            height,
            color_depth: color.bits_per_pixel() / channels,
            has_alpha: color.has_alpha(),
        }
    }

    fn thumbnail_of(&self, img: DynamicImage) -> anyhow::Result<Thumbnail> {
        let (width, height) = img.dimensions();
        let thumb = if width <= self.max_dimension && height <= self.max_dimension {
            img
        } else {
            img.thumbnail(self.max_dimension, self.max_dimension)
        };

        let mut buffer = Cursor::new(Vec::new());
        thumb
            .write_to(&mut buffer, ImageFormat::Png)
            .context("Failed to encode thumbnail")?;

        Ok(Thumbnail {
            data: buffer.into_inner(),
            content_type: THUMBNAIL_CONTENT_TYPE.to_string(),
            width: thumb.width(),
            height: thumb.height(),
        })
    }
}

impl ThumbnailGenerator for ImageThumbnailer {
    fn dimensions(&self, data: &[u8]) -> anyhow::Result<ImageInfo> {
        Ok(Self::info_of(&Self::decode(data)?))
    }

    fn thumbnail(&self, data: &[u8]) -> anyhow::Result<Thumbnail> {
        self.thumbnail_of(Self::decode(data)?)
    }

    fn analyze(
        &self,
        data: &[u8],
        with_thumbnail: bool,
    ) -> anyhow::Result<(ImageInfo, Option<Thumbnail>)> {
        let img = Self::decode(data)?;
        let info = Self::info_of(&img);
        let thumbnail = if with_thumbnail {
            Some(self.thumbnail_of(img)?)
        } else {
            None
        };
        Ok((info, thumbnail))
    }
}
