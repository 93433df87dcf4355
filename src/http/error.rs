//! Session-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::hooks::HookError;
use crate::resilience::{IdleTimeout, RetriesExhausted};

/// Everything that can end a session early.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    RetriesExhausted(#[from] RetriesExhausted),

    #[error("invalid outbound request: {0}")]
    RequestBuild(#[from] axum::http::Error),

    #[error("backend transport error: {0}")]
    Upstream(#[from] hyper::Error),

    #[error(transparent)]
    IdleTimeout(#[from] IdleTimeout),

    #[error("inbound request aborted: {0}")]
    InboundAborted(String),

    #[error("failed to decompress backend body: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to recompress body: {0}")]
    Compress(#[source] std::io::Error),

    #[error("codec task failed: {0}")]
    Codec(#[from] tokio::task::JoinError),
}

impl ProxyError {
    /// Status code reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RetriesExhausted(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    /// Status only: empty body, no headers.
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::{ConnectError, Endpoint};
    use std::time::Duration;

    #[test]
    fn test_exhausted_retries_map_to_504_with_empty_body() {
        let err = ProxyError::from(RetriesExhausted {
            attempts: 6,
            last_error: ConnectError::Timeout {
                endpoint: Endpoint::new("backend.local", 80),
                timeout: Duration::from_secs(6),
            },
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_terminal_errors_map_to_502() {
        assert_eq!(
            ProxyError::Hook(HookError::new("denied")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::IdleTimeout(IdleTimeout(Duration::from_secs(120))).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Decompress(std::io::Error::other("corrupt")).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
