//! One proxied request/response exchange.
//!
//! # Responsibilities
//! - Derive the outbound request and run the pre-request hook
//! - Hold the inbound body back while the backend connection is being set up
//! - Connect with retries, then forward the request
//! - Redial once when a reused keep-alive connection was closed under us
//! - Hand the backend response to pass-through or the transform pipeline
//! - Decide whether the backend connection is reusable afterwards
//!
//! # State Transitions
//! ```text
//! Start → Hooked: outbound head derived, hook resolved Ok
//! Hooked → Connected: connect_with_retries succeeded (else 504)
//! Connected → Responded: response head received before the exchange went idle (else 502)
//! Responded → Streaming | Transforming: classified
//! Streaming | Transforming → Done: connection released or discarded
//! ```
//!
//! # Design Decisions
//! - Every session runs inside its own `proxy_session` span
//! - The debug flag raises session logs from `debug` to `info`
//! - A connection is only pooled again after a clean end of both bodies
//! - Upload progress counts as activity for the idle timeout
//! - Dropping a lease stops its body pump; the backend exchange dies with the session

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Incoming};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::hooks::HookContext;
use crate::http::error::ProxyError;
use crate::http::forwarder::{ForwardAction, RequestForwarder};
use crate::http::proxy::ProxyShared;
use crate::http::request::OutboundRequest;
use crate::http::response::{classify, pass_through, ResponseContext, ResponsePath};
use crate::http::transform::transform;
use crate::net::pool::PooledConnection;
use crate::observability::metrics::{self, SessionPath};
use crate::resilience::{
    connect_with_retries, with_inactivity_timeout, ActivityClock, RetriesExhausted, RetryController,
};

/// Chunks in flight between the inbound reader and the backend request.
const PUMP_CHANNEL_DEPTH: usize = 16;

/// Log at `info` when the proxy runs in debug mode, else at `debug`.
macro_rules! session_log {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Unique identifier for a proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The task feeding the request body. Aborted on drop.
struct RequestPump(JoinHandle<()>);

impl RequestPump {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for RequestPump {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A backend connection plus the task still feeding it the request body.
///
/// Dropping the lease (the caller went away mid-exchange) stops the pump
/// and discards the connection.
pub struct ConnectionLease {
    conn: PooledConnection,
    pump: Option<RequestPump>,
}

impl ConnectionLease {
    pub(crate) fn new(conn: PooledConnection, pump: Option<JoinHandle<()>>) -> Self {
        Self {
            conn,
            pump: pump.map(RequestPump),
        }
    }

    /// End the lease. The connection is pooled again only when the
    /// response ended cleanly and the request body was fully sent.
    pub fn finish(self, clean: bool) {
        let Self { conn, pump } = self;
        let request_sent = pump.as_ref().map_or(true, RequestPump::is_finished);

        if clean && request_sent {
            tracing::trace!(connection_id = %conn.id(), "Releasing backend connection");
            conn.release();
            return;
        }

        drop(pump);
        conn.discard();
    }
}

/// Run one session to completion and produce the caller's response.
pub(crate) async fn run_session(shared: Arc<ProxyShared>, request: Request<Body>) -> Response<Body> {
    let session_id = SessionId::new();
    let span = tracing::info_span!(
        "proxy_session",
        session_id = %session_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    async move {
        let start_time = Instant::now();
        match proxy_session(&shared, request).await {
            Ok((response, path)) => {
                metrics::record_session(response.status().as_u16(), path, start_time);
                response
            }
            Err(e) => {
                let status = e.status();
                tracing::warn!(error = %e, status = status.as_u16(), "Proxy session failed");
                metrics::record_session(status.as_u16(), SessionPath::Failed, start_time);
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn proxy_session(
    shared: &ProxyShared,
    request: Request<Body>,
) -> Result<(Response<Body>, SessionPath), ProxyError> {
    let settings = &shared.settings;
    let (inbound, body) = request.into_parts();

    let mut outbound = OutboundRequest::from_inbound(settings, &inbound)?;
    if let Some(hook) = &settings.before {
        hook.before(
            HookContext {
                settings,
                inbound: &inbound,
            },
            &mut outbound.headers,
        )
        .await?;
    }
    session_log!(settings.debug, path = %outbound.path, "Forwarding request");

    let clock = ActivityClock::new();
    let (resume, pump, outbound_body) = if body.is_end_stream() {
        (None, None, Body::empty())
    } else {
        let (resume, pump, outbound_body) = spawn_inbound_pump(body, clock.clone());
        (Some(resume), Some(pump), outbound_body)
    };
    // Without a body the request can be replayed on another connection.
    let replayable = pump.is_none().then(|| outbound.clone());
    let request = outbound.into_request(outbound_body)?;

    // A dropped `resume` sender stops the pump if connecting fails.
    let endpoint = settings.endpoint();
    let mut controller = RetryController::new(settings.retry.clone());
    let mut conn = connect_with_retries(&shared.connections, &endpoint, &mut controller).await?;
    conn.set_idle_timeout(settings.idle_timeout);
    session_log!(
        settings.debug,
        connection_id = %conn.id(),
        attempts = controller.attempts(),
        "Connected to backend"
    );

    clock.touch();
    if let Some(resume) = resume {
        let _ = resume.send(());
    }
    let mut lease = ConnectionLease::new(conn, pump);

    let mut sent = send_within_idle(&mut lease, request, settings.idle_timeout, &clock).await;
    let stale = matches!(
        &sent,
        Err(ProxyError::Upstream(e)) if lease.conn.is_reused() && is_stale_connection(e)
    );
    if let (true, Some(replay)) = (stale, replayable) {
        session_log!(
            settings.debug,
            connection_id = %lease.conn.id(),
            "Reused backend connection was closed, redialing"
        );
        lease.finish(false);
        metrics::record_connect_retry();

        let mut conn = shared
            .connections
            .acquire_fresh(&endpoint, controller.connect_timeout())
            .await
            .map_err(|last_error| RetriesExhausted {
                attempts: controller.attempts() + 1,
                last_error,
            })?;
        conn.set_idle_timeout(settings.idle_timeout);
        clock.touch();
        lease = ConnectionLease::new(conn, None);
        let request = replay.into_request(Body::empty())?;
        sent = send_within_idle(&mut lease, request, settings.idle_timeout, &clock).await;
    }

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            lease.finish(false);
            return Err(e);
        }
    };

    let (parts, incoming) = response.into_parts();
    let context = ResponseContext::from_parts(&parts);
    let path = classify(&context);
    session_log!(
        settings.debug,
        status = context.status.as_u16(),
        content_type = context.content_type.as_deref().unwrap_or(""),
        ?path,
        "Backend responded"
    );

    match path {
        ResponsePath::PassThrough => Ok((
            pass_through(parts, incoming, lease, settings.idle_timeout),
            SessionPath::PassThrough,
        )),
        ResponsePath::Transform => {
            let response = transform(context, incoming, lease, settings, &inbound).await?;
            Ok((response, SessionPath::Transform))
        }
    }
}

/// Send the request and wait for the response head.
///
/// Fails once neither the upload nor the backend has made progress for `idle`.
async fn send_within_idle(
    lease: &mut ConnectionLease,
    request: Request<Body>,
    idle: Duration,
    clock: &ActivityClock,
) -> Result<hyper::Response<Incoming>, ProxyError> {
    Ok(with_inactivity_timeout(idle, clock, lease.conn.send_request(request)).await??)
}

/// The backend closed the connection before answering.
fn is_stale_connection(e: &hyper::Error) -> bool {
    e.is_incomplete_message() || e.is_canceled() || e.is_closed()
}

/// Prepare a paused pump from the inbound body to the backend request.
///
/// Returns the resume signal, the pump task and the outbound body fed by it.
/// Every chunk handed to the backend touches `clock`.
fn spawn_inbound_pump(body: Body, clock: ActivityClock) -> (oneshot::Sender<()>, JoinHandle<()>, Body) {
    let (resume_tx, resume_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel::<Result<Bytes, ProxyError>>(PUMP_CHANNEL_DEPTH);
    let pump = tokio::spawn(pump_inbound(body, resume_rx, tx, clock).in_current_span());

    let outbound = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    (resume_tx, pump, outbound)
}

async fn pump_inbound(
    mut body: Body,
    resume: oneshot::Receiver<()>,
    tx: mpsc::Sender<Result<Bytes, ProxyError>>,
    clock: ActivityClock,
) {
    let mut forwarder = RequestForwarder::new();
    forwarder.connecting();

    // The inbound stream stays paused until the backend is connected.
    if resume.await.is_err() {
        tracing::debug!("Connect failed, inbound body not forwarded");
        return;
    }

    let mut actions = forwarder.on_connected();
    loop {
        for action in actions.drain(..) {
            match action {
                ForwardAction::Write(data) => {
                    if tx.send(Ok(data)).await.is_err() {
                        return;
                    }
                    clock.touch();
                }
                // Dropping the sender ends the outbound body.
                ForwardAction::End => return,
            }
        }

        actions = match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => forwarder.on_chunk(data),
                Err(_) => Vec::new(),
            },
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Inbound request aborted");
                let _ = tx.send(Err(ProxyError::InboundAborted(e.to_string()))).await;
                return;
            }
            None => forwarder.on_end(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ConnectionManager, Endpoint};
    use std::convert::Infallible;

    fn chunked_body(chunks: Vec<&'static str>) -> Body {
        Body::from_stream(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, Infallible>(Bytes::from_static(c.as_bytes()))),
        ))
    }

    #[test]
    fn test_session_ids_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[tokio::test]
    async fn test_body_paused_until_resume_then_forwarded_in_order() {
        let clock = ActivityClock::new();
        let armed_at = clock.last_activity();
        let (resume, pump, outbound) = spawn_inbound_pump(chunked_body(vec!["ab", "cd", "ef"]), clock.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pump.is_finished(), "pump must wait for the connection");
        assert_eq!(clock.last_activity(), armed_at);

        resume.send(()).unwrap();
        let forwarded = outbound.collect().await.unwrap().to_bytes();
        assert_eq!(forwarded, Bytes::from_static(b"abcdef"));

        pump.await.unwrap();
        assert!(clock.last_activity() > armed_at, "forwarded chunks count as activity");
    }

    #[tokio::test]
    async fn test_dropped_lease_stops_pump_and_frees_slot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
        let manager = ConnectionManager::new(100, 100);
        let conn = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

        // An inbound body that never finishes.
        let body = Body::from_stream(stream::pending::<Result<Bytes, Infallible>>());
        let (resume, pump, outbound) = spawn_inbound_pump(body, ActivityClock::new());
        resume.send(()).unwrap();
        let lease = ConnectionLease::new(conn, Some(pump));
        assert_eq!(manager.active(&endpoint), 1);

        drop(lease);
        let ended = tokio::time::timeout(Duration::from_secs(1), outbound.collect()).await;
        assert!(ended.is_ok(), "outbound body should end once the pump is aborted");
        assert_eq!(manager.active(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_stops_pump() {
        let (resume, pump, outbound) = spawn_inbound_pump(chunked_body(vec!["ignored"]), ActivityClock::new());
        drop(resume);

        pump.await.unwrap();
        let forwarded = outbound.collect().await.unwrap().to_bytes();
        assert!(forwarded.is_empty());
    }
}
