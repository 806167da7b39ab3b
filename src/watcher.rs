//! Cancellation watcher
//!
//! One task per active scope. It parks until either the scope's lifetime
//! ends, in which case it flushes the scope, or the registry retires it
//! because the scope was already flushed or removed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::registry::ScopeRegistry;
use crate::scope::{Lifetime, ScopeId};

/// Decrements the active-watcher count when the task ends, however it ends
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn the watcher for `id` on the current tokio runtime
///
/// Returns `None` outside a runtime; such scopes only end through an explicit
/// flush or by dropping their handle.
pub(crate) fn spawn(
    registry: Weak<ScopeRegistry>,
    id: ScopeId,
    lifetime: Lifetime,
    retire: CancellationToken,
    active: Arc<AtomicUsize>,
) -> Option<JoinHandle<()>> {
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(scope = %id, "No tokio runtime, automatic flush disabled for scope");
            return None;
        }
    };

    let guard = ActiveGuard::new(active);

    Some(handle.spawn(async move {
        let _guard = guard;

        tokio::select! {
            _ = retire.cancelled() => {
                trace!(scope = %id, "Watcher retired");
            }
            reason = lifetime.ended() => {
                debug!(scope = %id, reason = reason.as_str(), "Scope lifetime ended");
                if let Some(registry) = registry.upgrade() {
                    // Errors are reported by the registry; a lost race is a no-op
                    let _ = registry.flush(id);
                }
            }
        }
    }))
}
