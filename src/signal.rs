//! Level-triggered readiness signals
//!
//! A [`ReadinessSignal`] is a boolean condition a task can wait on. Unlike a semaphore it
//! does not count: setting an already-set signal is a no-op, and a waiter that arrives while
//! the signal is set returns immediately without consuming it.

use tokio::sync::watch;

/// A boolean condition with `set`/`clear`/`wait`
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: watch::Sender<bool>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    /// Create a cleared signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the condition, waking every waiter
    pub fn set(&self) {
        self.set_to(true);
    }

    /// Clear the condition
    pub fn clear(&self) {
        self.set_to(false);
    }

    /// Set or clear the condition; waiters are only notified on a transition
    pub fn set_to(&self, value: bool) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Current state of the condition
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the condition is set
    ///
    /// Returns immediately if it already is. Cancel-safe.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// The two conditions a drain cycle waits on
#[derive(Debug, Default)]
pub struct ReadinessSignals {
    /// Set whenever a torrent is enqueued
    pub has_arrivals: ReadinessSignal,
    /// Set while the queue holds more than the configured minimum
    pub threshold_reached: ReadinessSignal,
}
