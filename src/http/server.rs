//! Standalone HTTP server for a proxy.
//!
//! # Responsibilities
//! - Mount the proxy at its configured path (or the root)
//! - Bind to a listener and serve until shutdown
//!
//! # Design Decisions
//! - Mounting strips the prefix, so the backend sees paths relative to it
//! - Graceful shutdown driven by the lifecycle broadcast channel

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::http::proxy::Proxy;

/// HTTP server hosting one proxy.
pub struct HttpServer {
    router: Router,
    proxy: Proxy,
}

impl HttpServer {
    pub fn new(proxy: Proxy) -> Self {
        let router = match mount_path(proxy.settings().path.as_deref()) {
            Some(path) => {
                tracing::debug!(path = %path, "Mounting proxy");
                Router::new().nest_service(&path, proxy.router())
            }
            None => proxy.router(),
        };
        Self { router, proxy }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.proxy.settings().endpoint(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Normalize a mount path; `None` for the root.
fn mount_path(path: Option<&str>) -> Option<String> {
    let trimmed = path?.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("/{trimmed}"))
    }
}
