//! Tracing initialization
//!
//! A `tracing-subscriber` registry with an `EnvFilter` and a single fmt layer, either
//! human-readable or JSON.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry};

const DEFAULT_FILTER: &str = "cairn=info,cairn_services=info,cairn_db=info,cairn_cache=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is not set
    pub default_filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    /// Reads `LOG_FORMAT` (`json` or anything else for plain text).
    pub fn from_env() -> Self {
        Self {
            format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_with_filter_overrides_default() {
        let config = TelemetryConfig::default().with_filter("debug");
        assert_eq!(config.default_filter, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
