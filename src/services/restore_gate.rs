//! Suspension token shared by the restore orchestrator and the reconciler.
//!
//! A restore holds a [`RestoreGuard`] for its whole run. While any guard is
//! alive (plus a settle delay after it drops, to absorb the trailing events
//! the bulk tab operations produce) the reconciler ignores tab events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

#[derive(Clone, Debug)]
pub struct RestoreGate {
    restoring: Arc<AtomicBool>,
    settle: Duration,
}

impl RestoreGate {
    pub fn new(settle: Duration) -> Self {
        Self {
            restoring: Arc::new(AtomicBool::new(false)),
            settle,
        }
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    /// Closes the gate, or returns `None` if a restore already holds it.
    pub fn try_acquire(&self) -> Option<RestoreGuard> {
        self.restoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        debug!("restore gate closed");
        Some(RestoreGuard {
            restoring: Arc::clone(&self.restoring),
            settle: self.settle,
        })
    }
}

/// Proof that the current task owns the gate. Reopens it on drop.
#[must_use = "the gate reopens as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RestoreGuard {
    restoring: Arc<AtomicBool>,
    settle: Duration,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        let restoring = Arc::clone(&self.restoring);
        let runtime = tokio::runtime::Handle::try_current();
        match runtime {
            Ok(handle) if !self.settle.is_zero() => {
                let settle = self.settle;
                handle.spawn(async move {
                    tokio::time::sleep(settle).await;
                    restoring.store(false, Ordering::SeqCst);
                    debug!("restore gate reopened");
                });
            }
            _ => {
                restoring.store(false, Ordering::SeqCst);
                debug!("restore gate reopened");
            }
        }
    }
}
