//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::template::TemplateVariant;

/// Root configuration for one proxied backend.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Backend host name or address. Required.
    pub server: Option<String>,

    /// Backend port. The `host` header omits it when unset.
    pub port: Option<u16>,

    /// Prefix prepended to every forwarded path (e.g. "/app").
    #[serde(alias = "baseUrl")]
    pub base_url: Option<String>,

    /// External mount path. Informational for the proxy itself; the demo
    /// host mounts the proxy under it.
    pub path: Option<String>,

    /// Raise per-session diagnostics to info level.
    pub debug: bool,

    /// Connect retry settings.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound connection pool limits.
    pub pool: PoolConfig,

    /// Template injection settings.
    pub template: TemplateConfig,
}

impl ProxyConfig {
    /// Configuration for `server`, with every other field defaulted.
    pub fn for_server(server: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            ..Self::default()
        }
    }
}

/// Connect retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt before giving up with a 504.
    pub max_retries: u32,

    /// Connect timeout of the first attempt in milliseconds.
    pub initial_connect_timeout_ms: u64,

    /// Added to the connect timeout after every failed attempt.
    pub timeout_increment_ms: u64,

    /// Upper bound for the escalated connect timeout. `None` disables it.
    pub max_connect_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_connect_timeout_ms: 1000,
            timeout_increment_ms: 1000,
            max_connect_timeout_ms: Some(120_000),
        }
    }
}

/// Timeout configuration for established connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle timeout applied once a backend connection is up, in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { idle_secs: 120 }
    }
}

/// Outbound connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent connections per backend endpoint.
    pub max_connections_per_endpoint: usize,

    /// Maximum idle connections kept for reuse per endpoint.
    pub max_idle_per_endpoint: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_endpoint: 100,
            max_idle_per_endpoint: 100,
        }
    }
}

/// Template injection configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Which pre-rendered page the header and footer are cut from.
    pub variant: TemplateVariant,
}

/// Listener configuration for the standalone host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Configuration of the demo host binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub listener: ListenerConfig,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// The proxied backend.
    pub proxy: ProxyConfig,

    /// HTML page containing the body markers, used as header/footer source.
    pub template_page: Option<PathBuf>,

    /// Cookie stripped from forwarded requests.
    pub session_cookie: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            log_level: "info".to_string(),
            proxy: ProxyConfig::default(),
            template_page: None,
            session_cookie: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_limits() {
        let config = ProxyConfig::default();
        assert_eq!(config.retries.max_retries, 5);
        assert_eq!(config.retries.timeout_increment_ms, 1000);
        assert_eq!(config.timeouts.idle_secs, 120);
        assert_eq!(config.pool.max_connections_per_endpoint, 100);
        assert_eq!(config.template.variant, TemplateVariant::Thick);
    }

    #[test]
    fn test_parse_camel_case_base_url() {
        let config: ProxyConfig = toml::from_str(
            r#"
            server = "backend.local"
            port = 8080
            baseUrl = "/app"
            path = "/demo"
            debug = true

            [retries]
            max_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.server.as_deref(), Some("backend.local"));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.base_url.as_deref(), Some("/app"));
        assert!(config.debug);
        assert_eq!(config.retries.max_retries, 2);
        assert_eq!(config.retries.initial_connect_timeout_ms, 1000);
    }
}
