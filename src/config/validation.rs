//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required fields (base document, tokens, upstream URL)
//! - Validate value ranges (port range wide enough for the pool)
//! - Check schedule expressions parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{Addition, ClientConfig, ServerConfig};
use crate::scheduler::Schedule;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a server configuration.
pub fn validate_server_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listen.is_empty() {
        errors.push(ValidationError::new("listen", "listen address is required"));
    }
    if config.base_document_path.is_empty() {
        errors.push(ValidationError::new("base_document_path", "is required"));
    }
    if config.tokens.is_empty() {
        errors.push(ValidationError::new("tokens", "at least one token is required"));
    }
    validate_additions(&config.additions, &mut errors);

    let dp = &config.dynamic_port;
    if dp.enabled {
        if dp.max <= dp.min {
            errors.push(ValidationError::new(
                "dynamic_port.max",
                format!("max ({}) must be greater than min ({})", dp.max, dp.min),
            ));
        } else {
            let width = usize::from(dp.max - dp.min) + 1;
            if width < dp.active_count {
                errors.push(ValidationError::new(
                    "dynamic_port.active_count",
                    format!("{} active ports do not fit in a range of {}", dp.active_count, width),
                ));
            }
        }
        if dp.active_count == 0 {
            errors.push(ValidationError::new("dynamic_port.active_count", "must be positive"));
        }
        if dp.target_port == 0 {
            errors.push(ValidationError::new("dynamic_port.target_port", "must be positive"));
        }
        if dp.chain_name.is_empty() {
            errors.push(ValidationError::new("dynamic_port.chain_name", "is required"));
        }
        if let Err(e) = Schedule::parse(&dp.cycle) {
            errors.push(ValidationError::new("dynamic_port.cycle", e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a client configuration.
pub fn validate_client_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server_url.is_empty() {
        errors.push(ValidationError::new("server_url", "is required"));
    } else if let Err(e) = url::Url::parse(&config.server_url) {
        errors.push(ValidationError::new("server_url", format!("invalid URL: {}", e)));
    }
    if config.update_interval == 0 {
        errors.push(ValidationError::new("update_interval", "must be positive"));
    }
    validate_additions(&config.additions, &mut errors);

    if config.process.enabled && config.process.bin_path.is_empty() {
        errors.push(ValidationError::new("process.bin_path", "is required"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_additions(additions: &[Addition], errors: &mut Vec<ValidationError>) {
    for (i, addition) in additions.iter().enumerate() {
        if addition.url.is_empty() {
            errors.push(ValidationError::new(format!("additions[{}].url", i), "is required"));
        }
        if addition.group_name.is_empty() {
            errors.push(ValidationError::new(
                format!("additions[{}].group_name", i),
                "is required",
            ));
        }
    }
}
