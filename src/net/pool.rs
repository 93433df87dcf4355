//! Outbound connection manager.
//!
//! # Responsibilities
//! - Cap concurrent connections per endpoint via semaphore
//! - Queue callers (FIFO) while an endpoint is saturated
//! - Reuse idle keep-alive connections before dialing new ones
//! - Dial past the idle list when a reused connection turned out stale
//! - Apply the per-attempt connect timeout to fresh connections
//!
//! # Design Decisions
//! - One instance per proxy (or shared explicitly); no process-wide agent
//! - The wait queue is unbounded, like a keep-alive agent's request queue
//! - A handle dropped without `release` discards its connection

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::net::connection::{ConnectError, Endpoint, OutboundConnection};

/// Per-endpoint slots and idle connections.
#[derive(Debug)]
struct EndpointPool {
    /// Semaphore to limit concurrent connections.
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<OutboundConnection>>,
    max_idle: usize,
}

impl EndpointPool {
    fn take_idle(&self) -> Option<OutboundConnection> {
        self.idle.lock().pop()
    }

    fn put_idle(&self, conn: OutboundConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// Owns pooled backend connections for any number of endpoints.
#[derive(Debug)]
pub struct ConnectionManager {
    endpoints: DashMap<Endpoint, Arc<EndpointPool>>,
    max_connections: usize,
    max_idle: usize,
}

impl ConnectionManager {
    /// Create a manager allowing `max_connections` concurrent connections per endpoint.
    pub fn new(max_connections: usize, max_idle: usize) -> Self {
        Self {
            endpoints: DashMap::new(),
            max_connections,
            max_idle,
        }
    }

    fn endpoint_pool(&self, endpoint: &Endpoint) -> Arc<EndpointPool> {
        self.endpoints
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(EndpointPool {
                    slots: Arc::new(Semaphore::new(self.max_connections)),
                    idle: Mutex::new(Vec::new()),
                    max_idle: self.max_idle,
                })
            })
            .clone()
    }

    /// Obtain a connection to `endpoint`.
    ///
    /// Waits for a free slot first (no timeout), then reuses an idle
    /// connection or dials a new one within `connect_timeout`.
    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<PooledConnection, ConnectError> {
        self.checkout(endpoint, connect_timeout, true).await
    }

    /// Like `acquire`, but always dials a new connection.
    pub async fn acquire_fresh(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<PooledConnection, ConnectError> {
        self.checkout(endpoint, connect_timeout, false).await
    }

    async fn checkout(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
        reuse_idle: bool,
    ) -> Result<PooledConnection, ConnectError> {
        let pool = self.endpoint_pool(endpoint);

        // Acquire permit first (backpressure)
        let permit = pool
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConnectError::PoolClosed(endpoint.clone()))?;

        while let Some(mut conn) = reuse_idle.then(|| pool.take_idle()).flatten() {
            match tokio::time::timeout(connect_timeout, conn.ready()).await {
                Ok(Ok(())) => {
                    tracing::trace!(connection_id = %conn.id(), endpoint = %endpoint, "Reusing idle connection");
                    return Ok(PooledConnection::new(conn, permit, pool, true));
                }
                _ => {
                    tracing::trace!(connection_id = %conn.id(), endpoint = %endpoint, "Dropping stale idle connection");
                }
            }
        }

        let conn = OutboundConnection::connect(endpoint, connect_timeout).await?;

        tracing::debug!(
            connection_id = %conn.id(),
            endpoint = %endpoint,
            available_slots = pool.slots.available_permits(),
            "Backend connection acquired"
        );

        Ok(PooledConnection::new(conn, permit, pool, false))
    }

    /// Return a connection for reuse.
    pub fn release(&self, handle: PooledConnection) {
        handle.release();
    }

    /// Connections to `endpoint` currently checked out.
    pub fn active(&self, endpoint: &Endpoint) -> usize {
        self.endpoints
            .get(endpoint)
            .map(|pool| self.max_connections - pool.slots.available_permits())
            .unwrap_or(0)
    }

    /// Idle connections to `endpoint` waiting for reuse.
    pub fn idle(&self, endpoint: &Endpoint) -> usize {
        self.endpoints
            .get(endpoint)
            .map(|pool| pool.idle.lock().len())
            .unwrap_or(0)
    }

    /// Configured per-endpoint connection cap.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection checked out of the pool.
///
/// Holds one slot of the endpoint's cap until released or dropped.
#[derive(Debug)]
pub struct PooledConnection {
    conn: OutboundConnection,
    pool: Arc<EndpointPool>,
    reused: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(conn: OutboundConnection, permit: OwnedSemaphorePermit, pool: Arc<EndpointPool>, reused: bool) -> Self {
        Self {
            conn,
            pool,
            reused,
            _permit: permit,
        }
    }

    /// True when this connection came from the idle list.
    ///
    /// The backend may have closed it after it passed the readiness check.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Put the connection back into the idle list and free the slot.
    pub fn release(self) {
        let Self { conn, pool, .. } = self;
        if !conn.is_closed() {
            pool.put_idle(conn);
        }
    }

    /// Close the connection and free the slot.
    pub fn discard(self) {
        tracing::trace!(connection_id = %self.conn.id(), "Discarding backend connection");
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = OutboundConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn accepting_endpoint() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_counts_active_connections() {
        let (_listener, endpoint) = accepting_endpoint().await;
        let manager = ConnectionManager::new(100, 100);

        let first = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();
        let second = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();
        assert_eq!(manager.active(&endpoint), 2);

        first.discard();
        assert_eq!(manager.active(&endpoint), 1);
        drop(second);
        assert_eq!(manager.active(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_saturated_endpoint_queues_until_release() {
        let (_listener, endpoint) = accepting_endpoint().await;
        let manager = Arc::new(ConnectionManager::new(1, 1));

        let held = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let manager = manager.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move { manager.acquire(&endpoint, Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "second acquire must wait for a slot");

        held.discard();
        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
        assert!(acquired.is_ok());
        assert_eq!(manager.active(&endpoint), 1);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_has_no_connections() {
        let manager = ConnectionManager::new(100, 100);
        let endpoint = Endpoint::new("127.0.0.1", 1);
        assert_eq!(manager.active(&endpoint), 0);
        assert_eq!(manager.idle(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_released_connection_is_reused_unless_fresh_requested() {
        let (_listener, endpoint) = accepting_endpoint().await;
        let manager = ConnectionManager::new(100, 100);

        let first = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();
        assert!(!first.is_reused());
        let first_id = first.id();
        first.release();
        assert_eq!(manager.idle(&endpoint), 1);

        let fresh = manager.acquire_fresh(&endpoint, Duration::from_secs(1)).await.unwrap();
        assert!(!fresh.is_reused());
        assert_ne!(fresh.id(), first_id);
        assert_eq!(manager.idle(&endpoint), 1, "fresh dial leaves the idle list alone");

        let reused = manager.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();
        assert!(reused.is_reused());
        assert_eq!(reused.id(), first_id);
        assert_eq!(manager.active(&endpoint), 2);
    }
}
