//! Cooperative cancellation scope shared by every suspension point.
//!
//! A [`CancelScope`] couples a [`CancellationToken`] with an optional
//! deadline. Child scopes observe their parent's cancellation; cancelling a
//! child never affects the parent.

use crate::error::{McpeekError, McpeekResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    /// Point in time the scope expires and the budget it was derived from.
    deadline: Option<(Instant, Duration)>,
}

impl CancelScope {
    /// A fresh root scope with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token (e.g. one cancelled by a Ctrl-C handler).
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A child scope: cancelled when this one is, cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child scope that additionally expires after `timeout`.
    ///
    /// An earlier deadline inherited from this scope wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some((existing, budget)) if existing <= at => Some((existing, budget)),
            _ => Some((at, timeout)),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Cancel this scope and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Deadline of this scope, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// The error describing why this scope is done, or `None` if it is live.
    pub fn error(&self) -> Option<McpeekError> {
        if self.token.is_cancelled() {
            return Some(McpeekError::Cancelled);
        }
        match self.deadline {
            Some((at, budget)) if Instant::now() >= at => Some(McpeekError::DeadlineExceeded(budget)),
            _ => None,
        }
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Resolve once the scope is done, yielding the reason.
    pub async fn done(&self) -> McpeekError {
        match self.deadline {
            Some((at, budget)) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => McpeekError::Cancelled,
                    _ = tokio::time::sleep_until(at) => McpeekError::DeadlineExceeded(budget),
                }
            }
            None => {
                self.token.cancelled().await;
                McpeekError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the scope ends first.
    pub async fn run<F, T>(&self, fut: F) -> McpeekResult<T>
    where
        F: Future<Output = McpeekResult<T>>,
    {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }

    /// Sleep for `duration`, returning early with the scope's error.
    pub async fn sleep(&self, duration: Duration) -> McpeekResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
