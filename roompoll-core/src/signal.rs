// ABOUTME: One-shot, idempotent wake-up used to end a poll early on first success.
// ABOUTME: Firing more than once is harmless; waiters registered before or after firing are released.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// First-success signal for a single poll cycle
#[derive(Debug, Default)]
pub struct FirstSuccess {
    fired: AtomicBool,
    notify: Notify,
}

impl FirstSuccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true only for the call that fired it first.
    pub fn fire(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolve once the signal has fired
    pub async fn fired(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent fire is not missed.
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}
