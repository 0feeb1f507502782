//! # Bridge Configuration
//!
//! Device address, timeouts and the TCP bridge endpoint, read from a single TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [printer]
//! host = "192.168.1.50"
//! request_timeout_secs = 30
//! poll_interval_secs = 10
//!
//! [session]
//! read_timeout_ms = 5000
//! data_folder = "/var/lib/dremel-bridge"
//!
//! [server]
//! bind = "127.0.0.1:8250"
//! ```
//!
//! Every field is optional. An empty `printer.host` leaves the session disabled.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the printer, the session and the TCP bridge.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote printer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_printer_name")]
    pub name: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            name: default_printer_name(),
        }
    }
}

/// Virtual serial session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub data_folder: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            data_folder: None,
        }
    }
}

/// TCP bridge settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Config {
    pub fn host(&self) -> &str {
        self.printer.host.trim()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.printer.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.printer.poll_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.session.read_timeout_ms)
    }

    /// Location of the persisted SD index, if a data folder is configured.
    pub fn sd_index_path(&self) -> Option<PathBuf> {
        self.session
            .data_folder
            .as_ref()
            .map(|dir| dir.join(SD_INDEX_FILE_NAME))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server.bind '{}': {}", self.server.bind, e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "printer.poll_interval_secs must be > 0".to_string(),
            ));
        }
        if self.printer.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "printer.request_timeout_secs must be > 0".to_string(),
            ));
        }
        self.bind_addr()?;
        Ok(())
    }
}

pub const SD_INDEX_FILE_NAME: &str = "sd_index.json";

// Default value functions
fn default_request_timeout_secs() -> u64 { 30 }
fn default_poll_interval_secs() -> u64 { 10 }
fn default_printer_name() -> String { "Dremel 3D45".to_string() }
fn default_read_timeout_ms() -> u64 { 5000 }
fn default_bind() -> String { "127.0.0.1:8250".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host(), "");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_millis(5000));
        assert_eq!(config.printer.name, "Dremel 3D45");
        assert!(config.sd_index_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[printer]\nhost = ' 10.0.0.7 '\npoll_interval_secs = 3\n\n[session]\ndata_folder = '/tmp/bridge'"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.host(), "10.0.0.7");
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        // Defaults for missing fields
        assert_eq!(config.printer.request_timeout_secs, 30);
        assert_eq!(
            config.sd_index_path(),
            Some(PathBuf::from("/tmp/bridge").join(SD_INDEX_FILE_NAME))
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_bad_bind() {
        let mut config = Config::default();
        config.printer.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.server.bind = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
