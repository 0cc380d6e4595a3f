use servo_protocol::ProtocolError;
use servo_tools::JointError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse joint limits {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration validation failed: {0}")]
    Validation(String),

    #[error("Invalid joint: {0}")]
    Joint(#[from] JointError),

    #[error("Invalid register map: {0}")]
    Registers(#[from] ProtocolError),

    #[error("No configuration path: pass --config or set SERVO_CONFIG")]
    NoConfigPath,
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation(message.into())
    }
}
