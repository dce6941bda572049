//! Connection manager: descriptor in, open session out, retrying transient
//! failures with bounded exponential backoff.

use crate::classify::{classify_error, ErrorClass};
use crate::session::{McpSession, Session, SessionOptions};
use async_trait::async_trait;
use mcpeek_core::{CancelScope, McpeekError, McpeekResult, TransportDescriptor};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Produces an open session from a descriptor in a single attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type handed to the caller.
    type Session: McpSession + 'static;

    /// Try once. On failure nothing may be left running.
    async fn attempt(
        &self,
        descriptor: &TransportDescriptor,
        scope: &CancelScope,
    ) -> McpeekResult<Self::Session>;
}

/// Connector for the real transports.
#[derive(Debug, Clone, Default)]
pub struct TransportConnector {
    options: SessionOptions,
}

impl TransportConnector {
    /// Connector using `options` for every session it opens.
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    type Session = Session;

    async fn attempt(
        &self,
        descriptor: &TransportDescriptor,
        scope: &CancelScope,
    ) -> McpeekResult<Session> {
        let mut session = Session::for_descriptor(descriptor, &self.options);
        match session.open(scope).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }
}

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// One try at connecting. Lives only inside [`ConnectionManager::connect`].
#[derive(Debug)]
pub struct ConnectionAttempt {
    /// 1-based attempt number.
    pub index: u32,
    /// When the attempt started.
    pub started_at: Instant,
    /// Why it failed.
    pub error: McpeekError,
    /// Retry classification of `error`.
    pub classification: ErrorClass,
}

/// Retrying front end over a [`Connector`].
pub struct ConnectionManager<C: Connector = TransportConnector> {
    connector: C,
    policy: RetryPolicy,
}

impl ConnectionManager<TransportConnector> {
    /// Manager for the real transports with the default retry policy.
    pub fn new(options: SessionOptions) -> Self {
        Self::with_connector(TransportConnector::new(options), RetryPolicy::default())
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager over any connector.
    pub fn with_connector(connector: C, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Connect to `descriptor`, retrying transient failures.
    ///
    /// The descriptor's timeout, when set, bounds all attempts together and
    /// surfaces as [`McpeekError::DeadlineExceeded`]. Cancellation returns
    /// the scope's error without further attempts.
    pub async fn connect(
        &self,
        scope: &CancelScope,
        descriptor: &TransportDescriptor,
    ) -> McpeekResult<C::Session> {
        let scope = match descriptor.timeout {
            Some(timeout) => scope.with_timeout(timeout),
            None => scope.clone(),
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut index = 0;

        loop {
            index += 1;
            if let Some(err) = scope.error() {
                return Err(err);
            }

            let started_at = Instant::now();
            debug!(server = %descriptor.name, attempt = index, target = %descriptor.target(), "Connecting");
            let error = match self.connector.attempt(descriptor, &scope).await {
                Ok(session) => {
                    info!(
                        server = %descriptor.name,
                        transport = descriptor.kind_label(),
                        attempts = index,
                        "MCP server connected"
                    );
                    return Ok(session);
                }
                Err(e) => e,
            };

            if let Some(err) = scope.error() {
                return Err(err);
            }

            let attempt = ConnectionAttempt {
                index,
                started_at,
                classification: classify_error(&error),
                error,
            };

            match attempt.classification {
                ErrorClass::Transient if attempt.index < max_attempts => {
                    let delay = self.policy.delay_after(attempt.index);
                    warn!(
                        server = %descriptor.name,
                        attempt = attempt.index,
                        max_attempts,
                        elapsed_ms = attempt.started_at.elapsed().as_millis() as u64,
                        delay_ms = delay.as_millis() as u64,
                        error = %attempt.error,
                        "MCP connect failed, retrying..."
                    );
                    scope.sleep(delay).await?;
                }
                ErrorClass::Transient => {
                    warn!(
                        server = %descriptor.name,
                        attempts = attempt.index,
                        error = %attempt.error,
                        "MCP connect failed, retries exhausted"
                    );
                    return Err(McpeekError::RetriesExhausted {
                        server: descriptor.name.clone(),
                        attempts: attempt.index,
                        source: Box::new(attempt.error),
                    });
                }
                ErrorClass::Permanent | ErrorClass::None => {
                    warn!(
                        server = %descriptor.name,
                        attempt = attempt.index,
                        error = %attempt.error,
                        "MCP connect failed permanently"
                    );
                    return Err(McpeekError::ConnectFailed {
                        server: descriptor.name.clone(),
                        attempts: attempt.index,
                        source: Box::new(attempt.error),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_saturates() {
        let p = RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(p.delay_after(80), Duration::from_secs(u64::from(u32::MAX)));
    }
}
