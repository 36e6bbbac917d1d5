//! Device configuration loaded from TOML.
//!
//! ```toml
//! [device]
//! board = "uno"
//! port = "COM42"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Board type key; anything unrecognized resolves to "uno".
    #[serde(default = "default_board")]
    pub board: String,
    /// Host-facing serial port name for the virtual pair.
    #[serde(default = "default_port")]
    pub port: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            board: default_board(),
            port: default_port(),
        }
    }
}

fn default_board() -> String {
    "uno".to_string()
}

fn default_port() -> String {
    "COM42".to_string()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_for_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.device.board, "uno");
        assert_eq!(config.device.port, "COM42");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\nboard = \"mega\"\nport = \"COM5\"").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.device.board, "mega");
        assert_eq!(config.device.port, "COM5");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config("definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device\nboard =").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
