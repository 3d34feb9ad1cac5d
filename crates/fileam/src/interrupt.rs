// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation for long file-area loops

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Shared cancel flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    pending: Arc<AtomicBool>,
    holdoff: Arc<AtomicU32>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the owning session to stop at its next interrupt check
    pub fn request_cancel(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// True when a cancel is pending and may be serviced now.
    /// Does not consume the request.
    #[must_use]
    pub fn should_cancel(&self) -> bool {
        self.is_pending() && self.holdoff.load(Ordering::SeqCst) == 0
    }

    /// Service a pending cancel request, if any
    pub fn check_for_interrupts(&self) -> Result<()> {
        if self.should_cancel() {
            self.pending.store(false, Ordering::SeqCst);
            return Err(Error::Canceled);
        }
        Ok(())
    }

    /// Defer cancellation until the returned guard is dropped
    #[must_use]
    pub fn hold(&self) -> HoldoffGuard {
        let _ = self.holdoff.fetch_add(1, Ordering::SeqCst);
        HoldoffGuard {
            holdoff: self.holdoff.clone(),
        }
    }
}

pub struct HoldoffGuard {
    holdoff: Arc<AtomicU32>,
}

impl Drop for HoldoffGuard {
    fn drop(&mut self) {
        let _ = self.holdoff.fetch_sub(1, Ordering::SeqCst);
    }
}
