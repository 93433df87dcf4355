//! Backend connection subsystem.
//!
//! # Data Flow
//! ```text
//! session needs a connection
//!     → pool.rs (wait for a slot, reuse idle or dial)
//!     → connection.rs (TCP connect under timeout, HTTP/1.1 handshake)
//!     → session sends the request
//!     → released to the idle list or discarded
//!
//! Connection States:
//!     Unconnected → Connecting → Connected → Ended
//! ```
//!
//! # Design Decisions
//! - At most `max_connections_per_endpoint` concurrent connections per backend
//! - Connections are kept alive and reused across sessions

pub mod connection;
pub mod pool;

pub use connection::{ConnectError, ConnectionId, ConnectionState, Endpoint, OutboundConnection};
pub use pool::{ConnectionManager, PooledConnection};
