//! Outbound backend connections.
//!
//! # Responsibilities
//! - Identify backend endpoints (host + port) for pooling
//! - Establish a TCP connection within a per-attempt connect timeout
//! - Run the HTTP/1.1 handshake and drive the connection in the background
//! - Generate unique connection IDs for tracing

use axum::body::Body;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

/// Where a session's backend connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt made yet.
    Unconnected,
    /// Waiting for a pool slot or for the TCP connect.
    Connecting,
    /// Connected; inbound bytes flow straight through.
    Connected,
    /// End-of-request signalled; nothing more is written.
    Ended,
}

/// A backend identity: connections are pooled per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Failure to establish a backend connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: Endpoint, timeout: Duration },

    #[error("connect to {endpoint} failed: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: Endpoint,
        #[source]
        source: hyper::Error,
    },

    #[error("connection pool for {0} is closed")]
    PoolClosed(Endpoint),
}

impl ConnectError {
    /// True when the connect timeout fired, as opposed to a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. })
    }
}

/// An HTTP/1.1 connection to a backend endpoint.
pub struct OutboundConnection {
    id: ConnectionId,
    endpoint: Endpoint,
    sender: SendRequest<Body>,
    connect_timeout: Duration,
    idle_timeout: Duration,
    requests: u64,
}

impl OutboundConnection {
    /// Connect to `endpoint`, giving up after `connect_timeout`.
    ///
    /// The idle timeout starts out equal to the connect timeout and is
    /// meant to be widened once the session owns the connection.
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, ConnectError> {
        let stream = tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            endpoint: endpoint.clone(),
            timeout: connect_timeout,
        })?
        .map_err(|source| ConnectError::Io {
            endpoint: endpoint.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|source| ConnectError::Handshake {
                endpoint: endpoint.clone(),
                source,
            })?;

        let id = ConnectionId::new();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(connection_id = %id, error = %e, "Backend connection closed with error");
            }
        });

        tracing::trace!(connection_id = %id, endpoint = %endpoint, "Backend connection established");

        Ok(Self {
            id,
            endpoint: endpoint.clone(),
            sender,
            connect_timeout,
            idle_timeout: connect_timeout,
            requests: 0,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Number of requests sent over this connection so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait until the connection can take another request.
    pub async fn ready(&mut self) -> Result<(), hyper::Error> {
        self.sender.ready().await
    }

    /// Send one request; the response body streams over this connection.
    pub async fn send_request(&mut self, request: Request<Body>) -> Result<Response<Incoming>, hyper::Error> {
        self.requests += 1;
        self.sender.send_request(request).await
    }
}

impl fmt::Debug for OutboundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("requests", &self.requests)
            .finish()
    }
}
