//! Drain cycle and persistent drain loop.

use crate::config::PersistPolicy;
use crate::error::{Error, Result};
use crate::types::{CycleReport, Event, TorrentDescriptor};
use futures::future::join_all;
use tokio::sync::mpsc::error::SendError;

use super::retry_worker::SHUTDOWN_ERROR_KIND;
use super::{DownloadPipeline, FailedSubmission, lock_unpoisoned};

/// Result of writing torrent records to the store
#[derive(Debug, Default)]
pub(crate) struct PersistOutcome {
    /// Records written
    pub(crate) persisted: usize,
    /// Records left in the pending buffer afterwards
    pub(crate) pending: usize,
    /// Store error, if the write failed
    pub(crate) error: Option<String>,
}

impl DownloadPipeline {
    /// Run one drain cycle
    ///
    /// 1. Waits until a producer has enqueued something, then clears that signal
    /// 2. Waits until the queue holds more than `min_batch_threshold` torrents, for at most
    ///    `threshold_timeout`
    /// 3. Drains up to `batch_size` torrents and submits them all concurrently
    /// 4. Persists the batch according to the [`PersistPolicy`]
    ///
    /// Individual submission failures never fail the cycle; they are logged, reported in the
    /// [`CycleReport`] and handed to the retry worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if shutdown starts before the cycle has drained
    /// anything. Once draining has begun the cycle always runs to completion.
    pub async fn run_drain_cycle(&self) -> Result<CycleReport> {
        let _cycle = self.state.cycle_lock.lock().await;

        let timed_out = tokio::select! {
            biased;
            _ = self.state.shutdown.cancelled() => return Err(Error::ShuttingDown),
            timed_out = self.wait_until_ready() => timed_out,
        };

        Ok(self.drain_and_dispatch(timed_out).await)
    }

    /// Spawn a task that runs drain cycles back to back until shutdown
    pub fn spawn_drain_loop(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run_drain_loop().await })
    }

    /// Run drain cycles back to back until shutdown
    pub async fn run_drain_loop(&self) {
        tracing::info!("Drain loop started");

        loop {
            match self.run_drain_cycle().await {
                Ok(report) => {
                    tracing::debug!(
                        drained = report.batch_len(),
                        submitted = report.submitted,
                        failed = report.failed,
                        "Drain loop finished cycle"
                    );
                }
                Err(Error::ShuttingDown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Drain cycle failed");
                }
            }
        }

        tracing::info!("Drain loop stopped");
    }

    /// Wait for arrivals, then for the threshold
    ///
    /// Returns `true` if the threshold wait timed out.
    async fn wait_until_ready(&self) -> bool {
        let arrivals = self.queue.has_arrivals();
        arrivals.wait().await;
        arrivals.clear();

        let threshold = self.queue.threshold_reached();
        match self.config.queue.threshold_timeout {
            None => {
                threshold.wait().await;
                false
            }
            Some(timeout) => match tokio::time::timeout(timeout, threshold.wait()).await {
                Ok(()) => false,
                Err(_) => {
                    tracing::debug!(
                        queued = self.queue.len(),
                        min_batch_threshold = self.queue.min_batch_threshold(),
                        timeout_secs = timeout.as_secs_f64(),
                        "Batch threshold not reached in time, draining what is queued"
                    );
                    true
                }
            },
        }
    }

    async fn drain_and_dispatch(&self, timed_out: bool) -> CycleReport {
        let batch = self.queue.drain_batch(self.config.queue.batch_size);
        let remaining = self.queue.len();
        if remaining > 0 {
            self.queue.has_arrivals().set();
        }

        let drained: Vec<TorrentDescriptor> =
            batch.iter().map(|item| item.torrent.clone()).collect();

        tracing::info!(
            count = batch.len(),
            remaining,
            timed_out,
            "Submitting batch to download client"
        );
        self.emit_event(Event::BatchDrained {
            count: batch.len(),
            timed_out,
        });

        let results = join_all(
            batch
                .iter()
                .map(|item| self.client.submit(&item.torrent, &item.series)),
        )
        .await;

        let persist_failed = self.config.queue.persist == PersistPolicy::AllDrained;
        let mut to_persist = Vec::with_capacity(batch.len());
        let mut failures = Vec::new();
        let mut submitted = 0;

        for (item, result) in batch.into_iter().zip(results) {
            match result {
                Ok(submission) => {
                    let torrent = item.torrent.submitted(&submission);
                    tracing::debug!(
                        torrent = %torrent.name,
                        series = %item.series.official_title,
                        hash = torrent.hash.as_deref(),
                        "Torrent submitted"
                    );
                    self.emit_event(Event::Submitted {
                        name: torrent.name.clone(),
                        hash: torrent.hash.clone(),
                    });
                    to_persist.push(torrent);
                    submitted += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        torrent = %item.torrent.name,
                        series = %item.series.official_title,
                        error_code = error.error_code(),
                        error = %error,
                        "Failed to submit torrent to download client"
                    );
                    self.emit_event(Event::DispatchFailed {
                        name: item.torrent.name.clone(),
                        error_code: error.error_code().to_string(),
                        error: error.to_string(),
                    });
                    if persist_failed {
                        to_persist.push(item.torrent.clone());
                    }
                    failures.push(FailedSubmission {
                        item,
                        error,
                        persisted: persist_failed,
                    });
                }
            }
        }

        let failed = failures.len();
        let outcome = self.persist_or_defer(to_persist).await;

        for failure in failures {
            self.hand_off_failure(failure).await;
        }

        tracing::info!(
            drained = drained.len(),
            submitted,
            failed,
            persisted = outcome.persisted,
            pending_persistence = outcome.pending,
            "Drain cycle complete"
        );

        CycleReport {
            drained,
            submitted,
            failed,
            persisted: outcome.persisted,
            pending_persistence: outcome.pending,
            persistence_error: outcome.error,
            threshold_timed_out: timed_out,
        }
    }

    /// Route a failed submission to the retry worker or straight to a dead letter
    async fn hand_off_failure(&self, failure: FailedSubmission) {
        if !self.should_retry(&failure.error) {
            self.dead_letter(
                &failure.item,
                1,
                failure.error.error_code(),
                failure.error.to_string(),
            )
            .await;
            return;
        }

        if self.state.shutdown.is_cancelled() {
            self.dead_letter(
                &failure.item,
                1,
                SHUTDOWN_ERROR_KIND,
                failure.error.to_string(),
            )
            .await;
            return;
        }

        if let Err(SendError(failure)) = self.state.retry_tx.send(failure) {
            // Retry worker already stopped
            self.dead_letter(
                &failure.item,
                1,
                SHUTDOWN_ERROR_KIND,
                failure.error.to_string(),
            )
            .await;
        }
    }

    /// Write `torrents` to the store together with anything left over from earlier failures
    ///
    /// On failure every record is kept in the pending buffer, in order, for the next attempt.
    pub(crate) async fn persist_or_defer(&self, torrents: Vec<TorrentDescriptor>) -> PersistOutcome {
        let batch = {
            let mut pending = lock_unpoisoned(&self.state.pending_persistence);
            let mut batch = std::mem::take(&mut *pending);
            batch.extend(torrents);
            batch
        };

        if batch.is_empty() {
            return PersistOutcome::default();
        }

        let count = batch.len();
        let result = self.store.add_all(&batch).await;
        match result {
            Ok(()) => {
                tracing::debug!(count, "Torrent records persisted");
                self.emit_event(Event::Persisted { count });
                PersistOutcome {
                    persisted: count,
                    pending: self.pending_persistence(),
                    error: None,
                }
            }
            Err(e) => {
                let error = Error::Persistence {
                    count,
                    message: e.to_string(),
                };
                tracing::error!(
                    count,
                    error = %e,
                    "Failed to persist torrent records, keeping them for the next cycle"
                );

                let pending = {
                    let mut pending = lock_unpoisoned(&self.state.pending_persistence);
                    let newer = std::mem::replace(&mut *pending, batch);
                    pending.extend(newer);
                    pending.len()
                };

                self.emit_event(Event::PersistenceFailed {
                    count: pending,
                    error: error.to_string(),
                });
                PersistOutcome {
                    persisted: 0,
                    pending,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}
