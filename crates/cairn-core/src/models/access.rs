use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Download,
    Stream,
    Metadata,
    Thumbnail,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Download => "download",
            AccessType::Stream => "stream",
            AccessType::Metadata => "metadata",
            AccessType::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(AccessType::Download),
            "stream" => Ok(AccessType::Stream),
            "metadata" => Ok(AccessType::Metadata),
            "thumbnail" => Ok(AccessType::Thumbnail),
            other => Err(format!("unknown access type: {}", other)),
        }
    }
}

/// One append-only access log row. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub file_id: Uuid,
    pub accessor: Option<Uuid>,
    pub access_type: AccessType,
    pub accessed_at: DateTime<Utc>,
}

impl AccessRecord {
    pub fn now(file_id: Uuid, accessor: Option<Uuid>, access_type: AccessType) -> Self {
        Self {
            file_id,
            accessor,
            access_type,
            accessed_at: Utc::now(),
        }
    }
}
