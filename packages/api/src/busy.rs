use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AppError;

/// Single-flight marker for a submit button.
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `Busy` if a submission is already pending.
    pub fn begin(&self) -> Result<InFlightGuard, AppError> {
        if self.0.swap(true, Ordering::AcqRel) {
            return Err(AppError::Busy);
        }
        Ok(InFlightGuard(self.0.clone()))
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the slot when dropped.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
