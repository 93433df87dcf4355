//! Pre-request hooks.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → outbound headers derived (request.rs)
//!     → BeforeProxy::before(context, &mut headers)   ← identity.rs, cookies.rs
//!     → Ok  → connect and forward
//!     → Err → session aborted with 502
//! ```
//!
//! # Design Decisions
//! - Runs once per session, before any network I/O
//! - The returned future is the continuation: forwarding resumes when it
//!   resolves, and a hook that never resolves stalls its session

use axum::http::request::Parts;
use axum::http::HeaderMap;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::ProxySettings;

pub mod cookies;
pub mod identity;

pub use cookies::strip_cookie;
pub use identity::{Identity, IdentityForwarding};

/// What a hook gets to see about the session.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub settings: &'a ProxySettings,
    pub inbound: &'a Parts,
}

/// Error reported by a hook. Aborts the session.
#[derive(Debug, Error)]
#[error("pre-request hook failed: {message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Hook run before the outbound request is sent.
pub trait BeforeProxy: Send + Sync {
    /// Inspect the session and mutate the outbound headers.
    fn before<'a>(
        &'a self,
        context: HookContext<'a>,
        headers: &'a mut HeaderMap,
    ) -> BoxFuture<'a, Result<(), HookError>>;
}
