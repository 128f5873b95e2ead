//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts, local port ranges)
//! - Parse the TCP service port range early so bad ranges fail at startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewireConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::GatewireConfig;
use crate::net::allocator::PortRange;

/// A single semantic problem in the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewireConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let wg = &config.wireguard;
    if wg.interface.trim().is_empty() {
        errors.push(ValidationError::new("wireguard.interface", "must not be empty"));
    }
    if wg.host.trim().is_empty() {
        errors.push(ValidationError::new("wireguard.host", "must not be empty"));
    }
    if wg.port == 0 {
        errors.push(ValidationError::new("wireguard.port", "must be greater than 0"));
    }
    // network, interface and at least one peer
    if wg.subnet.prefix_len() > 29 {
        errors.push(ValidationError::new(
            "wireguard.subnet",
            format!("{} is too small for a mesh", wg.subnet),
        ));
    }

    if let Some(range) = &config.services.port_range {
        if let Err(e) = range.parse::<PortRange>() {
            errors.push(ValidationError::new("services.port_range", e.to_string()));
        }
    }

    if config.oauth2.port_min == 0 || config.oauth2.port_min > config.oauth2.port_max {
        errors.push(ValidationError::new(
            "oauth2.port_min",
            format!(
                "invalid local port range {}-{}",
                config.oauth2.port_min, config.oauth2.port_max
            ),
        ));
    }

    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::new("probe.timeout_ms", "must be greater than 0"));
    }
    if config.probe.local_timeout_ms == 0 {
        errors.push(ValidationError::new("probe.local_timeout_ms", "must be greater than 0"));
    }
    if config.expiry.interval_secs == 0 {
        errors.push(ValidationError::new("expiry.interval_secs", "must be greater than 0"));
    }
    if config.health.interval_secs == 0 {
        errors.push(ValidationError::new("health.interval_secs", "must be greater than 0"));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", config.observability.log_format),
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
