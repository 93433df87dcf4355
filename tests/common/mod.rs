//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use futures_util::stream;
use portal_proxy::{Proxy, ProxyConfig, ProxyOptions, TemplateBlock, TemplateVariant};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const HTML_BODY: &str = "<p>B</p>";

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A port nothing listens on.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Echo the request back as JSON: method, uri, headers, body.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut echoed = Map::new();
    for (name, value) in headers.iter() {
        echoed.insert(
            name.as_str().to_string(),
            Value::String(value.to_str().unwrap_or_default().to_string()),
        );
    }
    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "headers": echoed,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Start the mock backend used by most integration tests.
///
/// Unknown paths are echoed back as JSON.
pub async fn start_backend() -> SocketAddr {
    let router = Router::new()
        .route("/json", get(|| async { Json(json!({"ok": true, "items": [1, 2, 3]})) }))
        .route(
            "/html",
            get(|| async { ([(CONTENT_TYPE, "text/html; charset=utf-8")], HTML_BODY) }),
        )
        .route(
            "/gzip",
            get(|| async {
                (
                    [(CONTENT_TYPE, "text/html"), (CONTENT_ENCODING, "gzip")],
                    gzip(HTML_BODY.as_bytes()),
                )
            }),
        )
        .route(
            "/deflate",
            get(|| async {
                (
                    [(CONTENT_TYPE, "text/html"), (CONTENT_ENCODING, "deflate")],
                    deflate(HTML_BODY.as_bytes()),
                )
            }),
        )
        .route(
            "/corrupt-gzip",
            get(|| async {
                (
                    [(CONTENT_TYPE, "text/html"), (CONTENT_ENCODING, "gzip")],
                    "definitely not gzip",
                )
            }),
        )
        .route(
            "/missing",
            get(|| async {
                (StatusCode::NOT_FOUND, [(CONTENT_TYPE, "text/html")], "<p>not here</p>").into_response()
            }),
        )
        .route(
            "/json-as-html",
            get(|| async { ([(CONTENT_TYPE, "text/html")], r#"{"a":1}"#) }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                ([(CONTENT_TYPE, "text/html")], HTML_BODY)
            }),
        )
        .route("/stall", get(stall))
        .fallback(echo);
    serve(router).await
}

/// One chunk right away, the rest after three seconds.
async fn stall() -> impl IntoResponse {
    let chunks = stream::unfold(0u8, |sent| async move {
        match sent {
            0 => Some((Ok::<_, Infallible>(Bytes::from_static(b"partial")), 1)),
            1 => {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Some((Ok(Bytes::from_static(b"late")), 2))
            }
            _ => None,
        }
    });
    ([(CONTENT_TYPE, "text/plain")], Body::from_stream(chunks))
}

/// Read one request head (no body) into `buf`. False once the peer is gone.
async fn read_head(socket: &mut tokio::net::TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            buf.drain(..end + 4);
            return true;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Keep-alive backend that hangs up on the second request it sees,
/// without answering it. Returns the address and the request counter.
pub async fn start_flaky_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                while read_head(&mut socket, &mut buf).await {
                    if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                        return;
                    }
                    let response = b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nok";
                    if socket.write_all(response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    (addr, seen)
}

/// Backend that accepts one connection, reads until the proxy closes it,
/// then fires the returned receiver.
pub async fn start_observed_backend() -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut chunk = [0u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });
    (addr, closed_rx)
}

/// Options targeting a local backend.
pub fn options_for(backend: SocketAddr) -> ProxyOptions {
    let mut config = ProxyConfig::for_server("127.0.0.1");
    config.port = Some(backend.port());
    ProxyOptions::new(config)
}

/// Header/footer engine that makes the variant visible.
pub fn test_engine(_: &Parts, variant: TemplateVariant, block: TemplateBlock) -> String {
    match block {
        TemplateBlock::Header => format!("<header data-variant=\"{variant}\">"),
        TemplateBlock::Footer => "<footer></footer>".to_string(),
    }
}

/// Build the proxy and serve its router on an ephemeral port.
pub async fn start_proxy(options: ProxyOptions) -> (Proxy, SocketAddr) {
    let proxy = Proxy::create(options).unwrap();
    let addr = serve(proxy.router()).await;
    (proxy, addr)
}

/// HTTP client without transparent decompression.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}
