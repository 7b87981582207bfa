//! Release and force-stop signalling for a single exchange.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::ProxyError;

/// Shared between the task running an exchange and the admin API.
#[derive(Debug, Default)]
pub struct ExchangeControl {
    stopped: AtomicBool,
    waiting: AtomicBool,
    released: Notify,
}

impl ExchangeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the exchange. Anything blocked in [`wait_for_release`] fails with
    /// `Terminated`, and so does every later wait.
    ///
    /// [`wait_for_release`]: ExchangeControl::wait_for_release
    pub fn force_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Let a held exchange continue. A release that arrives before the wait
    /// is remembered.
    pub fn release(&self) {
        self.released.notify_one();
    }

    /// Whether a unit is currently parked in `wait_for_release`.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub async fn wait_for_release(&self) -> Result<(), ProxyError> {
        let notified = self.released.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent force_stop
        // cannot slip between the check and the await.
        notified.as_mut().enable();
        if self.is_stopped() {
            return Err(ProxyError::Terminated);
        }

        self.waiting.store(true, Ordering::SeqCst);
        notified.await;
        self.waiting.store(false, Ordering::SeqCst);

        if self.is_stopped() {
            return Err(ProxyError::Terminated);
        }
        Ok(())
    }
}
