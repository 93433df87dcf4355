//! Resolution of proxy options into the immutable per-proxy record.
//!
//! # Responsibilities
//! - Accept the structured form (`ProxyConfig`) or the legacy positional list
//! - Attach the optional template engine and pre-request hook
//! - Validate, then freeze everything into `ProxySettings`
//!
//! # Design Decisions
//! - Fails fast: an invalid configuration never produces a proxy
//! - Settings are shared read-only across sessions (callbacks behind `Arc`)

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::schema::ProxyConfig;
use crate::config::validation::validate_config;
use crate::hooks::BeforeProxy;
use crate::net::connection::Endpoint;
use crate::resilience::retries::RetryPolicy;
use crate::template::{TemplateEngine, TemplateVariant};

const DEFAULT_HTTP_PORT: u16 = 80;

/// Unresolved proxy options: configuration plus callbacks.
#[derive(Clone, Default)]
pub struct ProxyOptions {
    config: ProxyConfig,
    template_engine: Option<Arc<dyn TemplateEngine>>,
    before: Option<Arc<dyn BeforeProxy>>,
}

impl ProxyOptions {
    /// Structured form.
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            template_engine: None,
            before: None,
        }
    }

    /// Legacy positional form: `(port, server, base_url, path, template_engine, before)`.
    pub fn positional(
        port: Option<u16>,
        server: impl Into<String>,
        base_url: Option<&str>,
        path: Option<&str>,
        template_engine: Option<Arc<dyn TemplateEngine>>,
        before: Option<Arc<dyn BeforeProxy>>,
    ) -> Self {
        let config = ProxyConfig {
            server: Some(server.into()),
            port,
            base_url: base_url.map(str::to_string),
            path: path.map(str::to_string),
            ..ProxyConfig::default()
        };
        Self {
            config,
            template_engine,
            before,
        }
    }

    pub fn template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.template_engine = Some(Arc::new(engine));
        self
    }

    pub fn before(mut self, hook: impl BeforeProxy + 'static) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Access the configuration before resolution (e.g. to tune timeouts).
    pub fn config_mut(&mut self) -> &mut ProxyConfig {
        &mut self.config
    }

    /// Validate and freeze into `ProxySettings`.
    pub fn resolve(self) -> Result<ProxySettings, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let config = self.config;
        let server = config
            .server
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        Ok(ProxySettings {
            server,
            port: config.port,
            base_url: config.base_url.unwrap_or_default(),
            path: config.path,
            debug: config.debug,
            retry: RetryPolicy::from(&config.retries),
            idle_timeout: Duration::from_secs(config.timeouts.idle_secs),
            max_connections: config.pool.max_connections_per_endpoint,
            max_idle: config.pool.max_idle_per_endpoint,
            template_variant: config.template.variant,
            template_engine: self.template_engine,
            before: self.before,
        })
    }
}

/// The canonical, immutable proxy configuration used by every session.
#[derive(Clone)]
pub struct ProxySettings {
    pub server: String,
    pub port: Option<u16>,
    /// Empty when no prefix is configured.
    pub base_url: String,
    pub path: Option<String>,
    pub debug: bool,
    pub retry: RetryPolicy,
    pub idle_timeout: Duration,
    pub max_connections: usize,
    pub max_idle: usize,
    pub template_variant: TemplateVariant,
    pub template_engine: Option<Arc<dyn TemplateEngine>>,
    pub before: Option<Arc<dyn BeforeProxy>>,
}

impl ProxySettings {
    /// The backend endpoint connections are pooled under.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.server, self.port.unwrap_or(DEFAULT_HTTP_PORT))
    }

    /// Value of the forwarded `host` header: `server[:port]`.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.server, port),
            None => self.server.clone(),
        }
    }

    /// Prepend the base URL to an inbound path-and-query.
    pub fn rewrite_path(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("debug", &self.debug)
            .field("retry", &self.retry)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("template_variant", &self.template_variant)
            .field("template_engine", &self.template_engine.is_some())
            .field("before", &self.before.is_some())
            .finish()
    }
}
