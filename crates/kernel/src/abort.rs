// SPDX-License-Identifier: MIT

//! A cooperative stop signal for a running session.
//!
//! Calling [`AbortHandle::abort`] never interrupts a step that's already
//! executing; the Kernel only checks the flag at the top of the loop and
//! between steps, so an in-flight tool call is always allowed to finish its
//! current attempt before the session winds down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    reason: Arc<parking_lot::Mutex<Option<String>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self, reason: impl Into<String>) {
        *self.reason.lock() = Some(reason.into());
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> String {
        self.reason.lock().clone().unwrap_or_else(|| "aborted".to_string())
    }
}
