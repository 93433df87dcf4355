//! HTTP proxying subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → proxy.rs (handler / tower::Service / router)
//!     → session.rs (one task per request, `proxy_session` span)
//!         → request.rs (outbound head: path rewrite, host header)
//!         → [BeforeProxy hook]
//!         → forwarder.rs (buffer inbound body until connected)
//!         → connect with retries (resilience, net)
//!     → response.rs (classify)
//!         → pass-through: stream unchanged
//!         → transform.rs: decode → template → encode
//!     → caller
//! ```

pub mod error;
pub mod forwarder;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod transform;

pub use error::ProxyError;
pub use forwarder::{ForwardAction, RequestForwarder};
pub use proxy::Proxy;
pub use request::OutboundRequest;
pub use response::{classify, ResponseContext, ResponsePath};
pub use server::HttpServer;
pub use session::{ConnectionLease, SessionId};
pub use transform::ContentEncoding;
