//! The mountable proxy handler.
//!
//! # Responsibilities
//! - Own the resolved settings and the connection manager
//! - Run one session per inbound request
//! - Expose itself as a plain async handler, a `tower::Service` and an Axum router
//!
//! # Design Decisions
//! - Cheap to clone; all clones share settings and pooled connections
//! - Never fails at the service level: errors become 502/504 responses

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ProxyOptions, ProxySettings};
use crate::http::session::run_session;
use crate::net::pool::ConnectionManager;

/// State shared by every session of one proxy.
pub(crate) struct ProxyShared {
    pub(crate) settings: ProxySettings,
    pub(crate) connections: Arc<ConnectionManager>,
}

/// A configured reverse proxy for one backend.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyShared>,
}

impl Proxy {
    /// Build a proxy with its own connection manager.
    pub fn new(settings: ProxySettings) -> Self {
        let connections = Arc::new(ConnectionManager::new(settings.max_connections, settings.max_idle));
        Self::with_connections(settings, connections)
    }

    /// Build a proxy on a caller-supplied connection manager, e.g. one
    /// shared by several proxies to the same backend.
    pub fn with_connections(settings: ProxySettings, connections: Arc<ConnectionManager>) -> Self {
        tracing::info!(
            endpoint = %settings.endpoint(),
            base_url = %settings.base_url,
            path = settings.path.as_deref().unwrap_or("/"),
            template = settings.template_engine.is_some(),
            hook = settings.before.is_some(),
            "Proxy created"
        );
        Self {
            inner: Arc::new(ProxyShared {
                settings,
                connections,
            }),
        }
    }

    /// Resolve `options` and build the proxy. Fails on invalid configuration.
    pub fn create(options: ProxyOptions) -> Result<Self, ConfigError> {
        Ok(Self::new(options.resolve()?))
    }

    /// Proxy one request.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        run_session(self.inner.clone(), request).await
    }

    /// Router sending every path and method through the proxy.
    pub fn router(&self) -> Router {
        let root = self.clone();
        let nested = self.clone();
        Router::new()
            .route("/", any(move |request: Request<Body>| async move { root.handle(request).await }))
            .route(
                "/{*path}",
                any(move |request: Request<Body>| async move { nested.handle(request).await }),
            )
            .layer(TraceLayer::new_for_http())
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.inner.settings
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.inner.connections
    }
}

impl tower::Service<Request<Body>> for Proxy {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let shared = self.inner.clone();
        Box::pin(async move { Ok(run_session(shared, request).await) })
    }
}
