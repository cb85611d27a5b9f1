//! Configuration module
//!
//! Settings for the content store: validation limits, concurrency bounds, cache budget
//! and lifetimes, cleanup cadence, thumbnailing, and the optional database connection.
//! Values come from the environment (with `.env` support) and fall back to the
//! constants below.

use std::env;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: usize = 50;
const BULK_UPLOAD_CONCURRENCY: usize = 4;
const CACHE_MAX_MB: usize = 256;
const CACHE_MAX_ITEM_MB: usize = 16;
const CACHE_CONTENT_TTL_SECS: u64 = 3600;
const CACHE_THUMBNAIL_TTL_SECS: u64 = 6 * 3600;
const CACHE_META_TTL_SECS: u64 = 600;
const CACHE_IDLE_CUTOFF_SECS: u64 = 1800;
const CACHE_RECENCY_CUTOFF_SECS: u64 = 60;
const CLEANUP_INTERVAL_SECS: u64 = 300;
const CLEANUP_JITTER_SECS: u64 = 30;
const THUMBNAIL_MAX_DIMENSION: u32 = 256;
const URL_FETCH_TIMEOUT_SECS: u64 = 60;

const DEFAULT_EXTENSIONS: &str =
    "jpg,jpeg,png,gif,webp,mp4,webm,mov,mp3,wav,ogg,flac,pdf,txt,md,doc,docx,zip,tar,gz,bin";
const DEFAULT_CONTENT_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp,\
video/mp4,video/webm,video/quicktime,\
audio/mpeg,audio/wav,audio/ogg,audio/flac,\
application/pdf,text/plain,text/markdown,application/msword,\
application/vnd.openxmlformats-officedocument.wordprocessingml.document,\
application/zip,application/x-tar,application/gzip,application/octet-stream";

/// Resolved store settings.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub environment: String,
    /// Absent means the in-memory repository is used
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Validation
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub safety_scan_enabled: bool,
    // Concurrency
    pub upload_concurrency: usize,
    pub bulk_upload_concurrency: usize,
    // Cache
    pub cache_max_bytes: usize,
    pub cache_max_item_bytes: usize,
    pub cache_content_ttl_secs: u64,
    pub cache_thumbnail_ttl_secs: u64,
    pub cache_meta_ttl_secs: u64,
    pub cache_idle_cutoff_secs: u64,
    pub cache_recency_cutoff_secs: u64,
    // Cleanup
    pub cleanup_interval_secs: u64,
    pub cleanup_jitter_secs: u64,
    // Post-processing
    pub thumbnail_enabled: bool,
    pub thumbnail_max_dimension: u32,
    pub url_fetch_timeout_secs: u64,
    pub public_base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            allowed_extensions: split_list(DEFAULT_EXTENSIONS),
            allowed_content_types: split_list(DEFAULT_CONTENT_TYPES),
            safety_scan_enabled: true,
            upload_concurrency: default_parallelism(),
            bulk_upload_concurrency: BULK_UPLOAD_CONCURRENCY,
            cache_max_bytes: CACHE_MAX_MB * 1024 * 1024,
            cache_max_item_bytes: CACHE_MAX_ITEM_MB * 1024 * 1024,
            cache_content_ttl_secs: CACHE_CONTENT_TTL_SECS,
            cache_thumbnail_ttl_secs: CACHE_THUMBNAIL_TTL_SECS,
            cache_meta_ttl_secs: CACHE_META_TTL_SECS,
            cache_idle_cutoff_secs: CACHE_IDLE_CUTOFF_SECS,
            cache_recency_cutoff_secs: CACHE_RECENCY_CUTOFF_SECS,
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
            cleanup_jitter_secs: CLEANUP_JITTER_SECS,
            thumbnail_enabled: true,
            thumbnail_max_dimension: THUMBNAIL_MAX_DIMENSION,
            url_fetch_timeout_secs: URL_FETCH_TIMEOUT_SECS,
            public_base_url: "http://localhost:4000".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = StoreConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let max_file_size_mb = parse_or("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB);
        let cache_max_mb = parse_or("CACHE_MAX_MB", CACHE_MAX_MB);
        let cache_max_item_mb = parse_or("CACHE_MAX_ITEM_MB", CACHE_MAX_ITEM_MB);

        let config = StoreConfig {
            environment,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            allowed_extensions: split_list(
                &env::var("ALLOWED_EXTENSIONS").unwrap_or_else(|_| DEFAULT_EXTENSIONS.to_string()),
            ),
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| DEFAULT_CONTENT_TYPES.to_string()),
            ),
            safety_scan_enabled: parse_bool("SAFETY_SCAN_ENABLED", true),
            upload_concurrency: parse_or("UPLOAD_CONCURRENCY", defaults.upload_concurrency),
            bulk_upload_concurrency: parse_or("BULK_UPLOAD_CONCURRENCY", BULK_UPLOAD_CONCURRENCY),
            cache_max_bytes: cache_max_mb * 1024 * 1024,
            cache_max_item_bytes: cache_max_item_mb * 1024 * 1024,
            cache_content_ttl_secs: parse_or("CACHE_CONTENT_TTL_SECS", CACHE_CONTENT_TTL_SECS),
            cache_thumbnail_ttl_secs: parse_or(
                "CACHE_THUMBNAIL_TTL_SECS",
                CACHE_THUMBNAIL_TTL_SECS,
            ),
            cache_meta_ttl_secs: parse_or("CACHE_META_TTL_SECS", CACHE_META_TTL_SECS),
            cache_idle_cutoff_secs: parse_or("CACHE_IDLE_CUTOFF_SECS", CACHE_IDLE_CUTOFF_SECS),
            cache_recency_cutoff_secs: parse_or(
                "CACHE_RECENCY_CUTOFF_SECS",
                CACHE_RECENCY_CUTOFF_SECS,
            ),
            cleanup_interval_secs: parse_or("CLEANUP_INTERVAL_SECS", CLEANUP_INTERVAL_SECS),
            cleanup_jitter_secs: parse_or("CLEANUP_JITTER_SECS", CLEANUP_JITTER_SECS),
            thumbnail_enabled: parse_bool("THUMBNAIL_ENABLED", true),
            thumbnail_max_dimension: parse_or("THUMBNAIL_MAX_DIMENSION", THUMBNAIL_MAX_DIMENSION),
            url_fetch_timeout_secs: parse_or("URL_FETCH_TIMEOUT_SECS", URL_FETCH_TIMEOUT_SECS),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        if self.upload_concurrency == 0 || self.bulk_upload_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_CONCURRENCY and BULK_UPLOAD_CONCURRENCY must be greater than 0"
            ));
        }

        if self.cache_max_item_bytes > self.cache_max_bytes {
            return Err(anyhow::anyhow!(
                "CACHE_MAX_ITEM_MB ({} bytes) cannot exceed CACHE_MAX_MB ({} bytes)",
                self.cache_max_item_bytes,
                self.cache_max_bytes
            ));
        }

        if self.cleanup_interval_secs == 0 {
            return Err(anyhow::anyhow!("CLEANUP_INTERVAL_SECS must be greater than 0"));
        }

        if self.thumbnail_enabled && self.thumbnail_max_dimension == 0 {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_MAX_DIMENSION must be greater than 0 when thumbnails are enabled"
            ));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.allowed_extensions.is_empty() || self.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_EXTENSIONS and ALLOWED_CONTENT_TYPES cannot be empty"
            ));
        }

        Ok(())
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config(pub Box<StoreConfig>);

impl Config {
    fn as_store(&self) -> &StoreConfig {
        &self.0
    }

    pub fn new(store: StoreConfig) -> Self {
        Config(Box::new(store))
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = StoreConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_store().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_store().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> Option<&str> {
        self.as_store().database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_store().db_max_connections
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.as_store().db_timeout_seconds)
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.as_store().max_file_size_bytes
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.as_store().allowed_extensions
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.as_store().allowed_content_types
    }

    pub fn safety_scan_enabled(&self) -> bool {
        self.as_store().safety_scan_enabled
    }

    pub fn upload_concurrency(&self) -> usize {
        self.as_store().upload_concurrency
    }

    pub fn bulk_upload_concurrency(&self) -> usize {
        self.as_store().bulk_upload_concurrency
    }

    pub fn cache_max_bytes(&self) -> usize {
        self.as_store().cache_max_bytes
    }

    pub fn cache_max_item_bytes(&self) -> usize {
        self.as_store().cache_max_item_bytes
    }

    pub fn cache_content_ttl(&self) -> Duration {
        Duration::from_secs(self.as_store().cache_content_ttl_secs)
    }

    pub fn cache_thumbnail_ttl(&self) -> Duration {
        Duration::from_secs(self.as_store().cache_thumbnail_ttl_secs)
    }

    pub fn cache_meta_ttl(&self) -> Duration {
        Duration::from_secs(self.as_store().cache_meta_ttl_secs)
    }

    pub fn cache_idle_cutoff(&self) -> Duration {
        Duration::from_secs(self.as_store().cache_idle_cutoff_secs)
    }

    pub fn cache_recency_cutoff(&self) -> Duration {
        Duration::from_secs(self.as_store().cache_recency_cutoff_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.as_store().cleanup_interval_secs)
    }

    pub fn cleanup_jitter(&self) -> Duration {
        Duration::from_secs(self.as_store().cleanup_jitter_secs)
    }

    pub fn thumbnail_enabled(&self) -> bool {
        self.as_store().thumbnail_enabled
    }

    pub fn thumbnail_max_dimension(&self) -> u32 {
        self.as_store().thumbnail_max_dimension
    }

    pub fn url_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.as_store().url_fetch_timeout_secs)
    }

    pub fn public_base_url(&self) -> &str {
        &self.as_store().public_base_url
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr + ToString>(key: &str, default: T) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.upload_concurrency >= 1);
        assert!(config.allowed_extensions.contains(&"png".to_string()));
        assert!(config
            .allowed_content_types
            .contains(&"application/zip".to_string()));
    }

    #[test]
    fn test_validate_rejects_item_larger_than_cache() {
        let config = StoreConfig {
            cache_max_bytes: 1024,
            cache_max_item_bytes: 2048,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CACHE_MAX_ITEM_MB"));
    }

    #[test]
    fn test_validate_rejects_non_postgres_url() {
        let config = StoreConfig {
            database_url: Some("mysql://localhost/cairn".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_getters_convert_durations() {
        let config = Config::new(StoreConfig {
            cache_meta_ttl_secs: 5,
            environment: "Production".to_string(),
            ..Default::default()
        });
        assert_eq!(config.cache_meta_ttl(), Duration::from_secs(5));
        assert!(config.is_production());
        assert!(config.database_url().is_none());
    }

    #[test]
    fn test_split_list_trims_and_lowercases() {
        assert_eq!(split_list(" PNG, jpg ,,"), vec!["png", "jpg"]);
    }
}
