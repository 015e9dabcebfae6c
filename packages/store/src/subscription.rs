//! Disposable handles for live subscriptions.
//!
//! Every `subscribe_*` call on a backend returns a [`Subscription`]. Cancelling
//! it (explicitly or by dropping it) detaches the listener. Cancellation is
//! idempotent, and a delivery that was already queued when the handle was
//! cancelled is dropped: backends check [`ActiveFlag::is_active`] immediately
//! before invoking a listener.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared liveness flag between a subscription handle and its listener slot.
#[derive(Clone, Debug)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that flipped the flag.
    fn deactivate(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Token for a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    active: ActiveFlag,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// `detach` runs once, on the first cancellation, to free the backend slot.
    pub fn new(active: ActiveFlag, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active,
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription that was never attached to anything.
    pub fn inert() -> Self {
        let active = ActiveFlag::new();
        active.deactivate();
        Self {
            active,
            detach: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    pub fn cancel(&mut self) {
        if self.active.deactivate() {
            if let Some(detach) = self.detach.take() {
                detach();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
