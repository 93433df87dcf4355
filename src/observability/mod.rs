//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, retry loop, transform pipeline produce:
//!     → tracing events inside a per-session span (session id, method, uri)
//!     → metrics.rs (counters, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber installed by the host binary
//!     → whatever metrics recorder the host installs (none by default)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder itself
//! - The `debug` config flag raises session diagnostics to info level

pub mod logging;
pub mod metrics;
