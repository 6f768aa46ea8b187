//! Configuration for the coordkv client

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix (`COORDKV_ENDPOINTS`, `COORDKV_REQUEST_TIMEOUT_MS`, ...)
pub const ENV_PREFIX: &str = "COORDKV";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Store endpoints (`host:port` or full `http://` URLs)
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Connection establishment deadline
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_ms: u64,

    /// Per-request deadline
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Events buffered per watch before the forwarder waits on the consumer
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_endpoints() -> Vec<String> {
    vec!["127.0.0.1:2379".to_string()]
}
fn default_dial_timeout() -> u64 {
    2_000
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_watch_buffer() -> usize {
    128
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            dial_timeout_ms: default_dial_timeout(),
            request_timeout_ms: default_request_timeout(),
            watch_buffer: default_watch_buffer(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional TOML file, then `COORDKV_*`
    /// environment variables. Missing values fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("endpoints"),
        );

        let config: ClientConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig("at least one endpoint is required".into()));
        }
        if let Some(blank) = self.endpoints.iter().find(|e| e.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!("blank endpoint: {:?}", blank)));
        }
        if self.dial_timeout_ms == 0 {
            return Err(Error::InvalidConfig("dial_timeout_ms must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be positive".into()));
        }
        if self.watch_buffer == 0 {
            return Err(Error::InvalidConfig("watch_buffer must be positive".into()));
        }
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_demo_settings() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoints, vec!["127.0.0.1:2379"]);
        assert_eq!(config.dial_timeout(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
endpoints = ["10.0.0.1:2379", "10.0.0.2:2379"]
request_timeout_ms = 2500
"#
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.request_timeout_ms, 2500);
        assert_eq!(config.dial_timeout_ms, 2_000);
        assert_eq!(config.watch_buffer, 128);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ClientConfig::load(Some(Path::new("/nonexistent/coordkv.toml")));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate() {
        let mut config = ClientConfig::default();
        config.endpoints.clear();
        assert!(config.validate().is_err());

        let config = ClientConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            watch_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            endpoints: vec!["  ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
