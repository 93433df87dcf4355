//! HTML body transform pipeline.
//!
//! # Data Flow
//! ```text
//! backend body (whole, buffered)
//!     → decode (gzip | deflate | identity)
//!     → inject: header fragment + body + footer fragment
//!     → headers: content-type = text/html, content-length dropped
//!     → encode with the backend's content-encoding
//!     → caller
//! ```
//!
//! # Design Decisions
//! - Buffering is unavoidable here: the template wraps the whole document
//! - Compression runs on the blocking pool, off the async workers
//! - A body starting with `{` is treated as mislabeled JSON and not wrapped
//! - Codec failures are terminal (502); compressed bytes are never relabeled

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::config::ProxySettings;
use crate::http::error::ProxyError;
use crate::http::response::ResponseContext;
use crate::http::session::ConnectionLease;
use crate::observability::metrics;
use crate::resilience::with_idle_timeout;
use crate::template::{TemplateBlock, TemplateEngine, TemplateVariant};

/// Supported `content-encoding` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    /// zlib-wrapped deflate, as HTTP `deflate` is specified.
    Deflate,
}

impl ContentEncoding {
    /// Anything other than gzip/deflate is handled as identity.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            _ => ContentEncoding::Identity,
        }
    }

    pub fn decode(self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len());
        match self {
            ContentEncoding::Identity => out.extend_from_slice(data),
            ContentEncoding::Gzip => {
                GzDecoder::new(data).read_to_end(&mut out)?;
            }
            ContentEncoding::Deflate => {
                ZlibDecoder::new(data).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }

    pub fn encode(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            ContentEncoding::Identity => Ok(data.to_vec()),
            ContentEncoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            ContentEncoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// Heuristic guard against JSON served as `text/html`.
pub fn looks_like_json(body: &[u8]) -> bool {
    body.first() == Some(&b'{')
}

/// Wrap `body` in the engine's header and footer.
///
/// Returns the body unchanged when there is no engine or the body looks
/// like JSON.
pub fn inject_template(
    engine: Option<&dyn TemplateEngine>,
    request: &Parts,
    variant: TemplateVariant,
    body: Vec<u8>,
) -> Vec<u8> {
    let Some(engine) = engine else {
        return body;
    };
    if looks_like_json(&body) {
        tracing::debug!("Body looks like JSON, skipping template");
        return body;
    }

    let header = engine.render(request, variant, TemplateBlock::Header);
    let footer = engine.render(request, variant, TemplateBlock::Footer);

    let mut out = Vec::with_capacity(header.len() + body.len() + footer.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(footer.as_bytes());
    out
}

/// Read the whole backend body, bounded by the idle timeout per frame.
async fn collect_body(incoming: &mut Incoming, idle_timeout: Duration) -> Result<Bytes, ProxyError> {
    let mut body = BytesMut::new();
    while let Some(frame) = with_idle_timeout(idle_timeout, incoming.frame()).await? {
        if let Ok(data) = frame?.into_data() {
            body.extend_from_slice(&data);
        }
    }
    Ok(body.freeze())
}

/// Run the full pipeline and build the caller's response.
pub async fn transform(
    context: ResponseContext,
    mut incoming: Incoming,
    lease: ConnectionLease,
    settings: &ProxySettings,
    request: &Parts,
) -> Result<Response<Body>, ProxyError> {
    let raw = match collect_body(&mut incoming, settings.idle_timeout).await {
        Ok(raw) => {
            lease.finish(true);
            raw
        }
        Err(e) => {
            lease.finish(false);
            return Err(e);
        }
    };

    let encoding = context.content_encoding;
    let decoded = tokio::task::spawn_blocking(move || encoding.decode(&raw))
        .await?
        .map_err(ProxyError::Decompress)?;

    let templated = settings.template_engine.is_some() && !looks_like_json(&decoded);
    let body = inject_template(
        settings.template_engine.as_deref(),
        request,
        settings.template_variant,
        decoded,
    );

    let mut headers = context.headers;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);

    let encoded = tokio::task::spawn_blocking(move || encoding.encode(&body))
        .await?
        .map_err(ProxyError::Compress)?;

    if settings.debug {
        tracing::info!(?encoding, templated, bytes = encoded.len(), "Transformed HTML body");
    } else {
        tracing::debug!(?encoding, templated, bytes = encoded.len(), "Transformed HTML body");
    }
    metrics::record_transformed_body(templated);

    let mut response = Response::new(Body::from(encoded));
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    Ok(response)
}
