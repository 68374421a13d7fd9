// Configuration Management
//
// This crate handles all configuration loading for the portal authentication
// middleware and its sample host. It provides:
// - Configuration structs and deserialization
// - File loading logic
// - Default configuration values
//
// This keeps configuration concerns separate from the authentication flow.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. Tried paths: {paths}")]
    FileNotFound { paths: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },
}

/// Main configuration loading interface
impl ApiConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ApiConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        // Try different config locations in order
        let config_paths = ["config/portal.yaml", "portal.yaml", "config/default.yaml"];

        for path in &config_paths {
            if std::path::Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        // If no config file found, fail with descriptive error
        Err(ConfigError::FileNotFound {
            paths: config_paths.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
portal:
  base_url: "https://portalbase.com/"
  client_id: "LoginProviderTest"
  client_secret: "S3cr3t"
  authentication_mode: active
"#
        )
        .unwrap();

        let config = ApiConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.portal.base_url, "https://portalbase.com/");
        assert_eq!(config.portal.client_id, "LoginProviderTest");
        assert_eq!(config.portal.authentication_mode, AuthenticationMode::Active);
        assert_eq!(config.portal.callback_path, DEFAULT_CALLBACK_PATH);
        assert_eq!(config.portal.scopes, vec!["login", "profile"]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 8080
logging:
  level: "debug"
  format: "json"
portal:
  base_url: "https://portalbase.com/"
  client_id: "id"
  client_secret: "secret"
  callback_path: "/auth/portal"
  scopes: ["login"]
  backchannel_timeout_secs: 5
  sign_in_as: "Cookies"
"#
        )
        .unwrap();

        let config = ApiConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.format, "json");
        assert!(config.logging.modules.is_empty());
        assert_eq!(config.portal.callback_path, "/auth/portal");
        assert_eq!(config.portal.scopes, vec!["login"]);
        assert_eq!(config.portal.backchannel_timeout_secs, 5);
        assert_eq!(config.portal.sign_in_as.as_deref(), Some("Cookies"));
    }

    #[test]
    fn test_load_from_file_missing_portal_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  host: \"127.0.0.1\"\n  port: 8080").unwrap();

        let result = ApiConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = ApiConfig::load_from_file("/definitely/not/here/portal.yaml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
