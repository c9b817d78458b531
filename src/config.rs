//! Runtime configuration
//!
//! Everything has a default matching the ERCOT ancillary service capacity
//! dashboard. A TOML file can override any subset of fields, and the
//! binaries apply command line flags on top of that.

use crate::flatten::FlattenConfig;
use crate::record::AssemblyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_URL: &str =
    "https://www.ercot.com/api/1/services/read/dashboards/ancillary-service-capacity-monitor";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const DEFAULT_SINK: &str = "ercot_ancillary_data.csv";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Dashboard endpoint polled by `dashmelt-poll`
    pub url: String,

    /// Value of the fixed `User-Agent` header
    pub user_agent: String,

    /// Network timeout for one fetch, in seconds
    pub timeout_secs: u64,

    /// Delimited file the records are appended to
    pub sink: PathBuf,

    pub assembly: AssemblyConfig,

    pub flatten: FlattenConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            url: DEFAULT_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            sink: PathBuf::from(DEFAULT_SINK),
            assembly: AssemblyConfig::default(),
            flatten: FlattenConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load a config file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.sink.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("sink path must not be empty".into()));
        }
        self.flatten.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::GroupAlias;
    use std::io::Write;

    fn load_str(text: &str) -> Result<AppConfig, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        AppConfig::load(file.path())
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_override() {
        let config = load_str(
            r#"
            url = "http://localhost:9000/dash"
            sink = "out/samples.csv"

            [assembly]
            min_fields = 12

            [flatten]
            key_denylist = ["tooltip"]
            root_scalar_prefix = "sys"

            [[flatten.group_aliases]]
            prefix = "reserve capability"
            alias = "RC"
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "http://localhost:9000/dash");
        assert_eq!(config.sink, PathBuf::from("out/samples.csv"));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.assembly.min_fields, 12);
        assert_eq!(config.assembly.payload_key, "data");
        assert_eq!(config.flatten.key_denylist, vec!["tooltip".to_string()]);
        assert_eq!(config.flatten.root_scalar_prefix.as_deref(), Some("sys"));
        assert_eq!(config.flatten.group_aliases, vec![GroupAlias::new("reserve capability", "RC")]);
        assert_eq!(config.flatten.separator, "_");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = load_str("retries = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(load_str("timeout_secs = 0"), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            load_str("[flatten]\nseparator = \"\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/dashmelt.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
