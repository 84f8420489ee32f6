//! Lock coordinator.
//!
//! Merges are rare, manual operations and the transaction already provides
//! row-level atomicity, so the advisory lock is best effort: when the lock
//! service is missing, failing, or busy past the timeout, the operation runs
//! without the lock instead of being refused.

use contentbank_model::{LockService, LockToken};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How the lock attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Held,
    TimedOut,
    Unavailable,
    NotConfigured,
}

/// Releases the lock when dropped, including on unwind.
struct HeldLock<'a> {
    service: &'a dyn LockService,
    token: Option<LockToken>,
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let name = token.name.clone();
            if let Err(e) = self.service.release(token) {
                warn!("Failed to release advisory lock '{}': {}", name, e);
            }
        }
    }
}

/// Serializes merge operations through an optional [`LockService`].
#[derive(Clone, Default)]
pub struct LockCoordinator {
    service: Option<Arc<dyn LockService>>,
}

impl LockCoordinator {
    pub fn new(service: Arc<dyn LockService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// A coordinator that never locks.
    pub fn unlocked() -> Self {
        Self { service: None }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Runs `f` under the named lock when it can be had, and without it otherwise.
    pub fn with_lock<T>(&self, name: &str, timeout: Duration, f: impl FnOnce() -> T) -> T {
        self.with_lock_status(name, timeout, |_| f())
    }

    /// Like [`LockCoordinator::with_lock`], telling `f` whether the lock is held.
    pub fn with_lock_status<T>(
        &self,
        name: &str,
        timeout: Duration,
        f: impl FnOnce(LockStatus) -> T,
    ) -> T {
        let Some(service) = self.service.as_deref() else {
            debug!("No lock service configured; running '{}' unlocked", name);
            return f(LockStatus::NotConfigured);
        };

        let (status, token) = match service.acquire(name, timeout) {
            Ok(Some(token)) => (LockStatus::Held, Some(token)),
            Ok(None) => {
                warn!(
                    "Timed out after {:?} waiting for lock '{}'; continuing without it",
                    timeout, name
                );
                (LockStatus::TimedOut, None)
            }
            Err(e) => {
                warn!("Lock service unavailable for '{}' ({}); continuing without it", name, e);
                (LockStatus::Unavailable, None)
            }
        };

        let _held = HeldLock { service, token };
        f(status)
    }
}
