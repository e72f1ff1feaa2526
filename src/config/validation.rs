//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Detect route collisions between the front-end and the relay
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use uuid::Uuid;

use crate::config::schema::AppConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every error found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.listener.max_head_bytes < 1024 {
        errors.push(ValidationError::new("listener.max_head_bytes", "must be at least 1024"));
    }
    if config.listener.head_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.head_timeout_secs", "must be greater than 0"));
    }

    let upgrade_path = &config.relay.upgrade_path;
    if !upgrade_path.starts_with('/') {
        errors.push(ValidationError::new("relay.upgrade_path", "must start with '/'"));
    }
    if config.relay.buffer_size == 0 {
        errors.push(ValidationError::new("relay.buffer_size", "must be greater than 0"));
    }

    if config.backend.host.is_empty() {
        errors.push(ValidationError::new("backend.host", "must not be empty"));
    }
    if config.backend.port == 0 {
        errors.push(ValidationError::new("backend.port", "must not be 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let sub = &config.subscription;
    if sub.path.is_empty() {
        errors.push(ValidationError::new("subscription.path", "must not be empty"));
    } else if sub.path.starts_with('/') {
        errors.push(ValidationError::new("subscription.path", "must not start with '/'"));
    } else {
        let route = format!("/{}", sub.path);
        if route == "/health" || route == *upgrade_path {
            errors.push(ValidationError::new(
                "subscription.path",
                format!("'{}' collides with another route", sub.path),
            ));
        }
    }
    if Uuid::parse_str(&sub.uuid).is_err() {
        errors.push(ValidationError::new(
            "subscription.uuid",
            format!("'{}' is not a UUID", sub.uuid),
        ));
    }
    if sub.domain.is_empty() {
        errors.push(ValidationError::new("subscription.domain", "must not be empty"));
    }

    if config.supervisor.enabled && config.supervisor.command.as_deref().unwrap_or("").is_empty() {
        errors.push(ValidationError::new(
            "supervisor.command",
            "required when the supervisor is enabled",
        ));
    }

    if config.health.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health.unhealthy_threshold", "must be greater than 0"));
    }
    if config.health.healthy_threshold == 0 {
        errors.push(ValidationError::new("health.healthy_threshold", "must be greater than 0"));
    }
    if config.health.enabled && config.health.interval_secs == 0 {
        errors.push(ValidationError::new("health.interval_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
