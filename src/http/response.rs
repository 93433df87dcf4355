//! Response classification and pass-through.
//!
//! # Responsibilities
//! - Capture status and headers of the backend response
//! - Decide between pass-through streaming and the transform pipeline
//! - Stream pass-through bodies frame by frame, in arrival order
//!
//! # Design Decisions
//! - Classification is a pure function so it can be tested and swapped alone
//! - Only `200` + `text/html` is transformed; everything else is untouched,
//!   `content-length` included
//! - The backend connection goes back to the pool only after a clean end

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::response::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::http::error::ProxyError;
use crate::http::session::ConnectionLease;
use crate::http::transform::ContentEncoding;
use crate::resilience::with_idle_timeout;

/// Frames buffered between the backend reader and the caller.
const RELAY_CHANNEL_DEPTH: usize = 16;

/// Status, headers and derived content metadata of a backend response.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_encoding: ContentEncoding,
    /// Primary content-type token, lower-cased, parameters stripped.
    pub content_type: Option<String>,
}

impl ResponseContext {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        let content_encoding = headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(ContentEncoding::from_header)
            .unwrap_or(ContentEncoding::Identity);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type);

        Self {
            status,
            headers,
            content_encoding,
            content_type,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.status, parts.headers.clone())
    }
}

/// How a response reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePath {
    PassThrough,
    Transform,
}

/// `text/html; charset=utf-8` → `text/html`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_html(content_type: Option<&str>) -> bool {
    content_type == Some("text/html")
}

/// Choose the response path from status and content type.
pub fn classify(context: &ResponseContext) -> ResponsePath {
    if context.status == StatusCode::OK && is_html(context.content_type.as_deref()) {
        ResponsePath::Transform
    } else {
        ResponsePath::PassThrough
    }
}

/// Stream the backend response to the caller unchanged.
pub fn pass_through(
    parts: Parts,
    incoming: Incoming,
    lease: ConnectionLease,
    idle_timeout: Duration,
) -> Response<Body> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, ProxyError>>(RELAY_CHANNEL_DEPTH);
    tokio::spawn(relay_body(incoming, tx, lease, idle_timeout).in_current_span());

    let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    Response::from_parts(parts, body)
}

async fn relay_body(
    mut incoming: Incoming,
    tx: mpsc::Sender<Result<Bytes, ProxyError>>,
    lease: ConnectionLease,
    idle_timeout: Duration,
) {
    let clean = loop {
        match with_idle_timeout(idle_timeout, incoming.frame()).await {
            Ok(Some(Ok(frame))) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if tx.send(Ok(data)).await.is_err() {
                    tracing::debug!("Caller went away mid-response");
                    break false;
                }
            }
            Ok(None) => break true,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "Backend response body failed");
                let _ = tx.send(Err(ProxyError::Upstream(e))).await;
                break false;
            }
            Err(elapsed) => {
                tracing::warn!(error = %elapsed, "Backend response body stalled");
                let _ = tx.send(Err(ProxyError::IdleTimeout(elapsed))).await;
                break false;
            }
        }
    };
    lease.finish(clean);
}
