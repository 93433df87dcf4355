//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or code
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → resolver.rs (attach callbacks, freeze)
//!     → ProxySettings (validated, immutable)
//!     → shared via Arc with every session
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod resolver;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use resolver::{ProxyOptions, ProxySettings};
pub use schema::{HostConfig, ListenerConfig, PoolConfig, ProxyConfig, RetryConfig, TimeoutConfig};
