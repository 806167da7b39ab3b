//! Lifetime signal of an execution scope
//!
//! A `Lifetime` ends when it is cancelled or when its deadline passes. It is
//! cheap to clone; clones observe the same signal, children observe their
//! parent's cancellation but can be cancelled on their own.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Why a lifetime ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `cancel()` was called on this lifetime or one of its ancestors
    Cancelled,
    /// The deadline (or timeout) passed
    DeadlineExceeded,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Cancelled => "cancelled",
            EndReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Cancellation and expiry signal for one logical operation
#[derive(Debug, Clone)]
pub struct Lifetime {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Lifetime {
    /// A lifetime that only ends on explicit cancellation
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A lifetime that ends after `timeout`, or earlier if cancelled
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A lifetime that ends at `deadline`, or earlier if cancelled
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child that ends with this lifetime or when cancelled itself
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child with an additional timeout
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(Instant::now() + timeout)
    }

    /// Derive a child with an additional deadline; the earlier deadline wins
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// End this lifetime and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the lifetime ended, or `None` while it is still running
    pub fn end_reason(&self) -> Option<EndReason> {
        if self.token.is_cancelled() {
            return Some(EndReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(EndReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_reason().is_some()
    }

    /// Wait until the lifetime ends
    ///
    /// Parks on the cancellation token and the deadline timer; never polls.
    pub async fn ended(&self) -> EndReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => EndReason::Cancelled,
                    _ = sleep_until(deadline) => EndReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                EndReason::Cancelled
            }
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}
