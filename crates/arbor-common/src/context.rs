//! Cancellation context carried by lock calls
//!
//! A `LockContext` bundles an external cancellation source with an optional
//! deadline. Only blocking waits observe it; short critical sections never do.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCause {
    /// The cancellation token fired
    Cancelled,
    /// The deadline elapsed
    DeadlineExceeded,
}

/// Cancellation token plus optional deadline
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl LockContext {
    /// Context that never times out and is only cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new().deadline_at(deadline)
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Tighten the deadline. An earlier deadline already present wins.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    /// Derive a context whose cancellation does not propagate to `self`
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check. Cancellation is reported ahead of an expired deadline.
    pub fn err(&self) -> Option<WaitCause> {
        if self.token.is_cancelled() {
            return Some(WaitCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(WaitCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> WaitCause {
        if let Some(cause) = self.err() {
            return cause;
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => WaitCause::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => WaitCause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                WaitCause::Cancelled
            }
        }
    }
}
