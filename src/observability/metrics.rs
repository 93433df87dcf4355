//! Metrics collection.
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): finished sessions by status and path
//! - `proxy_session_duration_seconds` (histogram): time to response head
//! - `proxy_connect_attempts_total` (counter): backend connect attempts
//! - `proxy_connect_retries_total` (counter): attempts after the first
//! - `proxy_transformed_bodies_total` (counter): bodies run through the template pipeline
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; no-ops until a recorder is installed
//! - Low-overhead metric updates (atomic operations)

use metrics::{counter, histogram};
use std::time::Instant;

/// Which response path a session took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPath {
    PassThrough,
    Transform,
    Failed,
}

impl SessionPath {
    fn as_str(self) -> &'static str {
        match self {
            SessionPath::PassThrough => "pass_through",
            SessionPath::Transform => "transform",
            SessionPath::Failed => "failed",
        }
    }
}

/// Record a finished session.
pub fn record_session(status: u16, path: SessionPath, start_time: Instant) {
    counter!(
        "proxy_sessions_total",
        "status" => status.to_string(),
        "path" => path.as_str()
    )
    .increment(1);
    histogram!("proxy_session_duration_seconds", "path" => path.as_str())
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_connect_attempt() {
    counter!("proxy_connect_attempts_total").increment(1);
}

pub fn record_connect_retry() {
    counter!("proxy_connect_retries_total").increment(1);
}

pub fn record_transformed_body(templated: bool) {
    counter!(
        "proxy_transformed_bodies_total",
        "templated" => if templated { "true" } else { "false" }
    )
    .increment(1);
}
