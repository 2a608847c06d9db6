//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{ClientConfig, ServerConfig};
use crate::config::validation::{validate_client_config, validate_server_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate the server configuration from a TOML file.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = read_toml(path)?;
    validate_server_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load, normalize and validate the client configuration from a TOML file.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let mut config: ClientConfig = read_toml(path)?;
    config.normalize();
    validate_client_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
