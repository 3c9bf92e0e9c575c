//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::retry_worker::SHUTDOWN_ERROR_KIND;
use super::{DownloadPipeline, lock_unpoisoned};

/// How long shutdown waits for an in-flight drain cycle or the retry worker
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl DownloadPipeline {
    /// Gracefully shut down the pipeline
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new torrents
    /// 2. Cancels the drain loop and the retry worker
    /// 3. Waits for an in-flight drain cycle to finish (30 second timeout)
    /// 4. Records every torrent still queued as a dead letter
    /// 5. Waits for the retry worker to record its in-flight retries
    /// 6. Makes a last attempt to persist pending torrent records
    /// 7. Marks a clean shutdown in the database, if the pipeline owns one
    ///
    /// The shutdown is only marked clean when the in-flight cycle and the retry worker
    /// finished in time and no torrent record is left unpersisted. Calling it again is
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if marking the clean shutdown fails. The other steps log their
    /// failures and shutdown continues.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_within(SHUTDOWN_TIMEOUT).await
    }

    /// [`shutdown`](Self::shutdown) with a custom wait for the cycle and the retry worker
    pub(crate) async fn shutdown_within(&self, timeout: Duration) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new torrents
        self.state.accepting_new.store(false, Ordering::SeqCst);

        // 2. Wake the drain loop and the retry worker
        self.state.shutdown.cancel();

        // 3. Wait for the current cycle, then hold the lock so no other cycle starts
        let cycle = match tokio::time::timeout(timeout, self.state.cycle_lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("Timeout waiting for drain cycle to finish, proceeding with shutdown");
                None
            }
        };

        // 4. Nothing will drain the queue any more
        let leftover = self.queue.drain_batch(usize::MAX);
        if !leftover.is_empty() {
            tracing::warn!(
                count = leftover.len(),
                "Recording queued torrents as dead letters"
            );
        }
        for item in &leftover {
            self.dead_letter(
                item,
                0,
                SHUTDOWN_ERROR_KIND,
                "pipeline shut down before the torrent was submitted".to_string(),
            )
            .await;
        }

        // 5. Let the retry worker dead-letter what it still holds
        let worker = lock_unpoisoned(&self.state.retry_worker).take();
        let worker_finished = match worker {
            Some(worker) => match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(())) => {
                    tracing::debug!("Retry worker finished");
                    true
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Retry worker panicked");
                    false
                }
                Err(_) => {
                    tracing::warn!("Timeout waiting for retry worker to finish");
                    false
                }
            },
            None => true,
        };

        // 6. Last attempt for records whose persistence failed earlier
        let outcome = self.persist_or_defer(Vec::new()).await;
        if outcome.pending > 0 {
            tracing::error!(
                count = outcome.pending,
                "Submitted torrents could not be persisted before shutdown"
            );
        }

        // 7. Mark clean shutdown
        let clean = cycle.is_some() && worker_finished && outcome.pending == 0;
        if let Some(db) = &self.db {
            if clean {
                db.set_clean_shutdown().await?;
                tracing::info!("Marked clean shutdown in database");
            } else {
                tracing::warn!(
                    cycle_finished = cycle.is_some(),
                    worker_finished,
                    unpersisted = outcome.pending,
                    "Shutdown left work unfinished, not marking it clean"
                );
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }
}
