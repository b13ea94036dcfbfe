//! Configuration management for stowbook
//!
//! This module handles loading and validation of stowbook configuration
//! from YAML files.

pub mod error;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use error::ConfigError;

// ==================== Configuration Types ====================

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the per-collection JSON files
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    /// Backup file restored into an empty store on startup
    #[serde(default)]
    pub seed_backup: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            seed_backup: None,
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

/// One deployment profile; the project id tags backups so a production
/// export is not silently restored into the wrong dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub project_id: String,
}

/// Named deployment profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Active profile name
    #[serde(default = "default_profile_name")]
    pub active: String,
    /// Profile definitions keyed by name
    #[serde(default = "default_profiles")]
    pub entries: BTreeMap<String, ProfileConfig>,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            active: default_profile_name(),
            entries: default_profiles(),
        }
    }
}

fn default_profile_name() -> String {
    "local".to_string()
}

fn default_profiles() -> BTreeMap<String, ProfileConfig> {
    let mut entries = BTreeMap::new();
    entries.insert(
        default_profile_name(),
        ProfileConfig {
            project_id: "stowbook-local".to_string(),
        },
    );
    entries
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Pagination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Records per page for lists
    #[serde(default = "default_records_per_page")]
    pub records_per_page: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            records_per_page: default_records_per_page(),
        }
    }
}

fn default_records_per_page() -> usize {
    50
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Data directory settings
    #[serde(default)]
    pub data: DataConfig,
    /// Deployment profiles
    #[serde(default)]
    pub profiles: ProfilesConfig,
    /// Pagination settings
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|err| ConfigError::InvalidYaml {
                reason: err.to_string(),
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                reason: "Port must be greater than 0".to_string(),
            });
        }

        if !self.profiles.entries.contains_key(&self.profiles.active) {
            return Err(ConfigError::UnknownProfile {
                name: self.profiles.active.clone(),
            });
        }

        if self.pagination.records_per_page == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pagination.records_per_page".to_string(),
                reason: "Records per page must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Project id of the active profile
    pub fn active_project_id(&self) -> &str {
        self.profiles
            .entries
            .get(&self.profiles.active)
            .map(|profile| profile.project_id.as_str())
            .unwrap_or("stowbook-local")
    }

    /// Data directory for the active profile, namespaced by profile name
    /// so switching profiles never mixes datasets
    pub fn profile_data_path(&self) -> PathBuf {
        self.data.path.join(&self.profiles.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.profiles.active, "local");
        assert_eq!(config.active_project_id(), "stowbook-local");
        assert_eq!(config.pagination.records_per_page, 50);
        config.validate().unwrap();
    }

    #[test]
    fn test_derived_default_matches_serde_defaults() {
        // Config::default() must agree with an empty YAML document; the
        // binary hands Config::default() to tests and tooling directly.
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.data.path, PathBuf::from("./data"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pagination.records_per_page, 50);

        let parsed: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.pagination.records_per_page, parsed.pagination.records_per_page);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 9000
data:
  path: /var/lib/stowbook
  seed_backup: ./backups/prod-latest.json
profiles:
  active: prod
  entries:
    prod:
      project_id: tracker-187c5
logging:
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.active_project_id(), "tracker-187c5");
        assert_eq!(
            config.profile_data_path(),
            PathBuf::from("/var/lib/stowbook/prod")
        );
        assert!(config.data.seed_backup.is_some());
    }

    #[test]
    fn test_unknown_active_profile_rejected() {
        let yaml = r#"
profiles:
  active: staging
  entries:
    local:
      project_id: stowbook-local
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), error::ConfigErrorCode::UnknownProfile);
    }

    #[test]
    fn test_zero_port_rejected() {
        let yaml = "server:\n  port: 0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
