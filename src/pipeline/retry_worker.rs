//! Background re-submission of failed torrents and dead-letter recording.

use crate::config::RetryConfig;
use crate::db::NewDeadLetter;
use crate::error::{DatabaseError, DispatchError, Error, Result};
use crate::retry::{IsRetryable, backoff_delay, retry_with_backoff};
use crate::types::{Event, WorkItem};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::DownloadPipeline;

/// Error kind recorded for torrents given up on because the pipeline stopped
pub(crate) const SHUTDOWN_ERROR_KIND: &str = "shutting_down";

/// A torrent whose first submission in a drain cycle failed
#[derive(Debug)]
pub(crate) struct FailedSubmission {
    /// The drained item
    pub(crate) item: WorkItem,
    /// Error from the drain cycle's attempt
    pub(crate) error: DispatchError,
    /// Whether the drain cycle already wrote this torrent to the store
    pub(crate) persisted: bool,
}

impl DownloadPipeline {
    /// Spawn the task that receives failed submissions from drain cycles
    ///
    /// Each failure gets its own retry task. On shutdown the intake is closed and everything
    /// still buffered or in flight is recorded as a dead letter before the task exits.
    pub(crate) fn spawn_retry_worker(
        &self,
        mut rx: mpsc::UnboundedReceiver<FailedSubmission>,
    ) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        let shutdown = self.state.shutdown.clone();

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Retry task panicked");
                        }
                    }
                    received = rx.recv() => match received {
                        Some(failed) => {
                            let pipeline = pipeline.clone();
                            tasks.spawn(async move { pipeline.retry_submission(failed).await });
                        }
                        None => break,
                    },
                }
            }

            // Later sends fail, and the drain cycle records those dead letters itself
            rx.close();
            while let Some(failed) = rx.recv().await {
                pipeline
                    .dead_letter(
                        &failed.item,
                        1,
                        SHUTDOWN_ERROR_KIND,
                        failed.error.to_string(),
                    )
                    .await;
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Retry task panicked");
                }
            }

            tracing::debug!("Retry worker stopped");
        })
    }

    /// Retry one failed torrent until it is accepted, exhausted, or shutdown intervenes
    async fn retry_submission(&self, failed: FailedSubmission) {
        let FailedSubmission {
            item,
            error,
            persisted,
        } = failed;
        let retry = &self.config.retry;

        // The drain cycle's submission counts as the first attempt
        let attempts = AtomicU32::new(1);
        let remaining = remaining_retries(retry);
        let resubmit = async {
            tokio::time::sleep(backoff_delay(retry, retry.initial_delay)).await;
            retry_with_backoff(&remaining, || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.client.submit(&item.torrent, &item.series)
            })
            .await
        };

        let outcome = tokio::select! {
            _ = self.state.shutdown.cancelled() => None,
            result = resubmit => Some(result),
        };

        match outcome {
            Some(Ok(submission)) => {
                let torrent = item.torrent.submitted(&submission);
                tracing::info!(
                    torrent = %torrent.name,
                    attempts = attempts.load(Ordering::Relaxed),
                    "Torrent submitted after retry"
                );
                self.emit_event(Event::Submitted {
                    name: torrent.name.clone(),
                    hash: torrent.hash.clone(),
                });
                if !persisted {
                    self.persist_or_defer(vec![torrent]).await;
                }
            }
            Some(Err(failure)) => {
                self.dead_letter(
                    &item,
                    attempts.load(Ordering::Relaxed),
                    failure.error.error_code(),
                    failure.error.to_string(),
                )
                .await;
            }
            None => {
                self.dead_letter(
                    &item,
                    attempts.load(Ordering::Relaxed),
                    SHUTDOWN_ERROR_KIND,
                    error.to_string(),
                )
                .await;
            }
        }
    }

    /// Whether a failed submission goes to the retry worker rather than straight to a
    /// dead letter
    pub(crate) fn should_retry(&self, error: &DispatchError) -> bool {
        let retry = &self.config.retry;
        retry.retry_failed && retry.max_attempts > 0 && error.is_retryable()
    }

    /// Record a torrent that will not be submitted again automatically
    ///
    /// A store failure here is logged; there is nowhere further to hand the torrent.
    pub(crate) async fn dead_letter(
        &self,
        item: &WorkItem,
        attempts: u32,
        error_kind: &str,
        error_message: String,
    ) {
        tracing::warn!(
            torrent = %item.torrent.name,
            series = %item.series.official_title,
            attempts,
            error_kind,
            error = %error_message,
            "Giving up on torrent, recording dead letter"
        );

        let letter = NewDeadLetter {
            torrent: item.torrent.clone(),
            series: (*item.series).clone(),
            attempts,
            error_kind: error_kind.to_string(),
            error_message: error_message.clone(),
        };

        if let Err(e) = self.store.record_dead_letter(&letter).await {
            tracing::error!(
                torrent = %item.torrent.name,
                error = %e,
                "Failed to record dead letter, torrent is lost"
            );
        }

        self.emit_event(Event::DeadLettered {
            name: item.torrent.name.clone(),
            attempts,
            error: error_message,
        });
    }

    /// Put a dead-lettered torrent back on the queue and remove the record
    ///
    /// Requires a pipeline created with [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] for an unknown id, [`Error::ShuttingDown`] or
    /// [`Error::QueueFull`] if the queue refuses the torrent. The record is removed before the
    /// torrent is queued, so a failed delete leaves nothing queued and a refused torrent is
    /// written back under the same id.
    pub async fn requeue_dead_letter(&self, id: i64) -> Result<()> {
        let db = self.db.as_ref().ok_or_else(|| Error::Config {
            message: "requeueing dead letters requires a pipeline opened on a database"
                .to_string(),
            key: Some("persistence.database_path".to_string()),
        })?;

        let letter = db.get_dead_letter(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "dead letter {} not found",
                id
            )))
        })?;
        let (torrent, series) = letter.decode()?;

        db.delete_dead_letter(id).await?;

        if let Err(e) = self.enqueue_torrents(vec![torrent], series) {
            if let Err(restore) = db.restore_dead_letter(&letter).await {
                tracing::error!(
                    dead_letter_id = id,
                    torrent = %letter.name,
                    error = %restore,
                    "Failed to restore dead letter after the queue refused it"
                );
            }
            return Err(e);
        }

        tracing::info!(dead_letter_id = id, torrent = %letter.name, "Dead letter requeued");
        Ok(())
    }
}

/// Retry budget left once the worker has made its own first attempt
fn remaining_retries(config: &RetryConfig) -> RetryConfig {
    let next_delay =
        Duration::from_secs_f64(config.initial_delay.as_secs_f64() * config.backoff_multiplier);
    RetryConfig {
        max_attempts: config.max_attempts.saturating_sub(1),
        initial_delay: next_delay.min(config.max_delay),
        ..config.clone()
    }
}
