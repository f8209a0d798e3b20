use std::path::PathBuf;
use thiserror::Error;

use localsite_core::DesiredConfigError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid site definition: {0}")]
    Desired(#[from] DesiredConfigError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
