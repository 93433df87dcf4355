//! Embeddable reverse proxy with header/footer template injection.
//!
//! A [`Proxy`] forwards every request it receives to one backend, retrying
//! the connect phase with an escalating timeout, and wraps successful HTML
//! responses in markup produced by a [`TemplateEngine`].
//!
//! ```text
//! caller → Proxy (router / tower::Service)
//!     → session: hook → connect (pool, retries) → forward
//!     → classify: pass-through | decode → template → encode
//! caller ← response
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Extension points
pub mod hooks;
pub mod template;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{ConfigError, HostConfig, ProxyConfig, ProxyOptions, ProxySettings};
pub use hooks::{BeforeProxy, HookContext, HookError, Identity, IdentityForwarding};
pub use http::{HttpServer, Proxy, ProxyError};
pub use lifecycle::Shutdown;
pub use net::ConnectionManager;
pub use template::{MarkerTemplate, TemplateBlock, TemplateEngine, TemplateVariant};
