//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, pool size > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend server is required")]
    MissingServer,

    #[error("backend port must be non-zero")]
    InvalidPort,

    #[error("base_url must start with '/' (got {0:?})")]
    InvalidBaseUrl(String),

    #[error("pool.max_connections_per_endpoint must be at least 1")]
    EmptyPool,

    #[error("retries.initial_connect_timeout_ms must be non-zero")]
    ZeroConnectTimeout,

    #[error("timeouts.idle_secs must be non-zero")]
    ZeroIdleTimeout,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.server.as_deref() {
        Some(server) if !server.trim().is_empty() => {}
        _ => errors.push(ValidationError::MissingServer),
    }

    if config.port == Some(0) {
        errors.push(ValidationError::InvalidPort);
    }

    if let Some(base_url) = config.base_url.as_deref() {
        if !base_url.is_empty() && !base_url.starts_with('/') {
            errors.push(ValidationError::InvalidBaseUrl(base_url.to_string()));
        }
    }

    if config.pool.max_connections_per_endpoint == 0 {
        errors.push(ValidationError::EmptyPool);
    }

    if config.retries.initial_connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }

    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::ZeroIdleTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_server_rejected() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingServer]);

        let blank = ProxyConfig::for_server("   ");
        assert!(validate_config(&blank).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.port = Some(0);
        config.base_url = Some("app".into());
        config.pool.max_connections_per_endpoint = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBaseUrl("app".into())));
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(validate_config(&ProxyConfig::for_server("backend.local")).is_ok());
    }
}
