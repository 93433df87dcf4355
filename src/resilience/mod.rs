//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Session needs a backend connection:
//!     → retries.rs (attempt with connect timeout, escalate and retry on failure)
//!     → exhausted → 504 Gateway Timeout
//! Connected:
//!     → timeouts.rs (idle timeout on every backend read, reset by upload progress)
//!     → elapsed → terminal error for the session
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend wait has a deadline
//! - Retries only before any byte has been exchanged

pub mod retries;
pub mod timeouts;

pub use retries::{connect_with_retries, RetriesExhausted, RetryController, RetryDecision, RetryPolicy, RetryState};
pub use timeouts::{with_idle_timeout, with_inactivity_timeout, ActivityClock, IdleTimeout};
