//! Connect retry logic.
//!
//! # Responsibilities
//! - Track the attempt count of one session's connect phase
//! - Escalate the connect timeout after every failed attempt
//! - Stop after the configured number of retries
//!
//! # State Transitions
//! ```text
//! Idle → Attempting: first connection attempt
//! Attempting → Attempting: connect failure/timeout, retries < max (timeout += increment)
//! Attempting → Succeeded: connected
//! Attempting → Exhausted: connect failure/timeout, retries == max (session answers 504)
//! ```
//!
//! # Design Decisions
//! - Only the connect phase is retried; once connected, failures are terminal
//! - Timeouts and refusals count alike and escalate alike
//! - No delay between attempts; the growing timeout is the back-off

use std::time::Duration;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::net::connection::{ConnectError, Endpoint};
use crate::net::pool::{ConnectionManager, PooledConnection};
use crate::observability::metrics;

/// Limits for the connect retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_timeout: Duration,
    pub increment: Duration,
    /// Ceiling for the escalated timeout. `None` means unbounded.
    pub max_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_timeout: Duration::from_millis(config.initial_connect_timeout_ms),
            increment: Duration::from_millis(config.timeout_increment_ms),
            max_timeout: config.max_connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl RetryPolicy {
    /// Connect timeout for the 1-based `attempt`.
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        let escalation = self.increment.saturating_mul(attempt.saturating_sub(1));
        self.cap(self.initial_timeout.saturating_add(escalation))
    }

    fn cap(&self, timeout: Duration) -> Duration {
        match self.max_timeout {
            Some(max) => timeout.min(max),
            None => timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    Succeeded,
    Exhausted,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again with this connect timeout.
    Retry { connect_timeout: Duration },
    /// Budget spent; give up.
    Exhausted,
}

/// Per-session retry state machine.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    state: RetryState,
    attempts: u32,
    connect_timeout: Duration,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        let connect_timeout = policy.timeout_for_attempt(1);
        Self {
            policy,
            state: RetryState::Idle,
            attempts: 0,
            connect_timeout,
        }
    }

    /// Start the first attempt; returns its connect timeout.
    pub fn begin(&mut self) -> Duration {
        if self.state == RetryState::Idle {
            self.state = RetryState::Attempting;
            self.attempts = 1;
        }
        self.connect_timeout
    }

    pub fn on_success(&mut self) {
        if self.state == RetryState::Attempting {
            self.state = RetryState::Succeeded;
        }
    }

    /// Record a failed attempt and decide whether to retry.
    pub fn on_failure(&mut self) -> RetryDecision {
        if self.state != RetryState::Attempting {
            return RetryDecision::Exhausted;
        }

        if self.retries() >= self.policy.max_retries {
            self.state = RetryState::Exhausted;
            return RetryDecision::Exhausted;
        }

        self.attempts += 1;
        self.connect_timeout = self.policy.cap(self.connect_timeout.saturating_add(self.policy.increment));
        RetryDecision::Retry {
            connect_timeout: self.connect_timeout,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Attempts made so far, including the first.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

/// The connect phase gave up.
#[derive(Debug, Error)]
#[error("gave up connecting after {attempts} attempts: {last_error}")]
pub struct RetriesExhausted {
    pub attempts: u32,
    #[source]
    pub last_error: ConnectError,
}

/// Acquire a connection to `endpoint`, retrying under `controller`.
pub async fn connect_with_retries(
    manager: &ConnectionManager,
    endpoint: &Endpoint,
    controller: &mut RetryController,
) -> Result<PooledConnection, RetriesExhausted> {
    let mut connect_timeout = controller.begin();

    loop {
        metrics::record_connect_attempt();

        match manager.acquire(endpoint, connect_timeout).await {
            Ok(conn) => {
                controller.on_success();
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    attempt = controller.attempts(),
                    timed_out = e.is_timeout(),
                    error = %e,
                    "Backend connect failed"
                );

                match controller.on_failure() {
                    RetryDecision::Retry { connect_timeout: next } => {
                        metrics::record_connect_retry();
                        tracing::info!(
                            endpoint = %endpoint,
                            retry = controller.retries(),
                            connect_timeout = ?next,
                            "Retrying backend connect"
                        );
                        connect_timeout = next;
                    }
                    RetryDecision::Exhausted => {
                        return Err(RetriesExhausted {
                            attempts: controller.attempts(),
                            last_error: e,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_failing(controller: &mut RetryController) -> Vec<Duration> {
        let mut timeouts = vec![controller.begin()];
        while let RetryDecision::Retry { connect_timeout } = controller.on_failure() {
            timeouts.push(connect_timeout);
        }
        timeouts
    }

    #[test]
    fn test_six_attempts_with_linear_escalation() {
        let mut controller = RetryController::new(RetryPolicy::default());
        let timeouts = always_failing(&mut controller);

        assert_eq!(controller.attempts(), 6);
        assert_eq!(controller.retries(), 5);
        assert_eq!(controller.state(), RetryState::Exhausted);
        let expected: Vec<Duration> = (1..=6).map(|k| Duration::from_millis(1000 * k)).collect();
        assert_eq!(timeouts, expected);
    }

    #[test]
    fn test_timeout_for_attempt_matches_controller() {
        let policy = RetryPolicy::default();
        let mut controller = RetryController::new(policy.clone());
        let timeouts = always_failing(&mut controller);
        for (k, timeout) in timeouts.iter().enumerate() {
            assert_eq!(*timeout, policy.timeout_for_attempt(k as u32 + 1));
        }
    }

    #[test]
    fn test_ceiling_caps_escalation() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_timeout: Duration::from_millis(1000),
            increment: Duration::from_millis(1000),
            max_timeout: Some(Duration::from_millis(2500)),
        };
        let mut controller = RetryController::new(policy);
        let timeouts = always_failing(&mut controller);
        assert_eq!(timeouts.len(), 11);
        assert_eq!(*timeouts.last().unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn test_unbounded_without_ceiling() {
        let policy = RetryPolicy {
            max_timeout: None,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.timeout_for_attempt(200), Duration::from_millis(200_000));
    }

    #[test]
    fn test_success_after_retry() {
        let mut controller = RetryController::new(RetryPolicy::default());
        controller.begin();
        assert!(matches!(controller.on_failure(), RetryDecision::Retry { .. }));
        controller.on_success();
        assert_eq!(controller.state(), RetryState::Succeeded);
        assert_eq!(controller.attempts(), 2);
        assert_eq!(controller.on_failure(), RetryDecision::Exhausted);
    }

    #[test]
    fn test_zero_retries_gives_single_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let mut controller = RetryController::new(policy);
        controller.begin();
        assert_eq!(controller.on_failure(), RetryDecision::Exhausted);
        assert_eq!(controller.attempts(), 1);
    }

    #[tokio::test]
    async fn test_refused_backend_exhausts_after_six_attempts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = ConnectionManager::new(100, 100);
        let endpoint = Endpoint::new("127.0.0.1", port);
        let mut controller = RetryController::new(RetryPolicy::default());

        let err = connect_with_retries(&manager, &endpoint, &mut controller)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 6);
        assert_eq!(controller.connect_timeout(), Duration::from_millis(6000));
        assert_eq!(manager.active(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_silent_backend_exhausts_with_escalated_connect_timeouts() {
        // Non-routable: SYNs go unanswered, so every attempt hits its connect timeout.
        let manager = ConnectionManager::new(100, 100);
        let endpoint = Endpoint::new("10.255.255.1", 81);
        let policy = RetryPolicy {
            max_retries: 5,
            initial_timeout: Duration::from_millis(50),
            increment: Duration::from_millis(50),
            max_timeout: None,
        };
        let mut controller = RetryController::new(policy);

        let started = std::time::Instant::now();
        let err = connect_with_retries(&manager, &endpoint, &mut controller)
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 6);
        assert_eq!(controller.connect_timeout(), Duration::from_millis(50 + 5 * 50));
        assert_eq!(manager.active(&endpoint), 0);
        if let ConnectError::Io { source, .. } = &err.last_error {
            // Hosts without any route reject the dial outright.
            eprintln!("10.255.255.1 unreachable here ({source}), timeout path not exercised");
            return;
        }
        assert!(err.last_error.is_timeout(), "got {}", err.last_error);
        // 50 + 100 + ... + 300 ms spent waiting on connect timeouts.
        assert!(started.elapsed() >= Duration::from_millis(1050));
    }
}
