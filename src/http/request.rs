//! Outbound request derivation.
//!
//! # Responsibilities
//! - Rewrite the path: base URL + inbound path and query
//! - Copy inbound headers (names are already lower-case in `HeaderMap`)
//! - Point `host` at the backend (`server[:port]`)
//!
//! # Design Decisions
//! - Headers are exposed mutably to the pre-request hook before sending
//! - Origin-form URIs: the connection already targets the backend

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Version};

use crate::config::ProxySettings;
use crate::http::error::ProxyError;

/// The request about to be sent to the backend, minus its body.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    /// Derive the backend request from the inbound request head.
    pub fn from_inbound(settings: &ProxySettings, inbound: &Parts) -> Result<Self, ProxyError> {
        let path_and_query = inbound
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut headers = inbound.headers.clone();
        let host = HeaderValue::from_str(&settings.host_header())
            .map_err(|e| ProxyError::RequestBuild(e.into()))?;
        headers.insert(HOST, host);

        Ok(Self {
            method: inbound.method.clone(),
            path: settings.rewrite_path(path_and_query),
            headers,
        })
    }

    /// Attach the body and build the HTTP/1.1 request.
    pub fn into_request(self, body: Body) -> Result<Request<Body>, ProxyError> {
        let mut request = Request::builder()
            .method(self.method)
            .uri(self.path)
            .version(Version::HTTP_11)
            .body(body)?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}
