//! Timeout enforcement on established connections.
//!
//! # Responsibilities
//! - Bound every wait on an established backend connection (response
//!   headers, each body frame) by the idle timeout
//! - Keep a streaming upload alive for as long as chunks keep moving
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The deadline is measured from the last observed activity, not from
//!   the start of the wait
//! - An idle timeout after connecting is terminal for the session, never retried
//! - Timeout errors are distinct from transport errors

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// The backend stayed silent for longer than the idle timeout.
#[derive(Debug, Clone, Copy, Error)]
#[error("backend idle for more than {0:?}")]
pub struct IdleTimeout(pub Duration);

/// Await `future`, failing with `IdleTimeout` after `idle`.
pub async fn with_idle_timeout<F>(idle: Duration, future: F) -> Result<F::Output, IdleTimeout>
where
    F: Future,
{
    tokio::time::timeout(idle, future)
        .await
        .map_err(|_| IdleTimeout(idle))
}

/// Last time bytes moved on a backend exchange.
///
/// Cloned into whatever produces traffic; every clone touches the same clock.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    last: Arc<Mutex<Instant>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last.lock()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Await `future`, failing with `IdleTimeout` once `clock` has seen no
/// activity for `idle`.
pub async fn with_inactivity_timeout<F>(
    idle: Duration,
    clock: &ActivityClock,
    future: F,
) -> Result<F::Output, IdleTimeout>
where
    F: Future,
{
    tokio::pin!(future);
    loop {
        let deadline = clock.last_activity() + idle;
        tokio::select! {
            output = &mut future => return Ok(output),
            _ = tokio::time::sleep_until(deadline) => {
                // Activity since the deadline was armed pushes it out again.
                if clock.last_activity() + idle <= Instant::now() {
                    return Err(IdleTimeout(idle));
                }
            }
        }
    }
}
