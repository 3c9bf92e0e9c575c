//! Download pipeline split into focused submodules.
//!
//! The [`DownloadPipeline`] struct and its methods are organized by domain:
//! - [`enqueue`] - Producer entrypoint
//! - [`drain`] - Drain cycle and persistent drain loop
//! - [`retry_worker`] - Background retries and dead-letter recording
//! - [`lifecycle`] - Graceful shutdown

mod drain;
mod enqueue;
mod lifecycle;
mod retry_worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::client::DownloadClient;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::queue::BatchQueue;
use crate::store::TorrentStore;
use crate::types::{Event, QueueStats, TorrentDescriptor};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

pub(crate) use retry_worker::FailedSubmission;

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_BUFFER: usize = 1000;

/// Shared run state (shutdown flags, cross-cycle buffers)
#[derive(Clone)]
pub(crate) struct PipelineState {
    /// Flag to indicate whether new torrents are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown; wakes the drain loop and the retry worker
    pub(crate) shutdown: CancellationToken,
    /// Serializes drain cycles so there is only ever one consumer
    pub(crate) cycle_lock: Arc<tokio::sync::Mutex<()>>,
    /// Submitted torrents whose persistence failed, written on the next cycle
    pub(crate) pending_persistence: Arc<std::sync::Mutex<Vec<TorrentDescriptor>>>,
    /// Channel to the retry worker
    pub(crate) retry_tx: mpsc::UnboundedSender<FailedSubmission>,
    /// Retry worker task, taken on shutdown
    pub(crate) retry_worker: Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

/// Batching download pipeline (cloneable - all fields are Arc-wrapped)
///
/// Producers call [`enqueue_torrents`](Self::enqueue_torrents); a single consumer runs
/// [`run_drain_cycle`](Self::run_drain_cycle) on a schedule or keeps
/// [`spawn_drain_loop`](Self::spawn_drain_loop) running.
#[derive(Clone)]
pub struct DownloadPipeline {
    /// Shared queue between producers and the drain controller
    pub(crate) queue: Arc<BatchQueue>,
    /// Download backend
    pub(crate) client: Arc<dyn DownloadClient>,
    /// Persistence for submitted torrents and dead letters
    pub(crate) store: Arc<dyn TorrentStore>,
    /// SQLite handle when the pipeline owns its database
    pub(crate) db: Option<Arc<Database>>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Shutdown flags and cross-cycle buffers
    pub(crate) state: PipelineState,
}

impl DownloadPipeline {
    /// Open the SQLite database named in the configuration and build a pipeline on it
    ///
    /// The database doubles as the [`TorrentStore`]. Startup is recorded so an unclean exit
    /// can be detected next time.
    pub async fn open(config: Config, client: Arc<dyn DownloadClient>) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        if db.was_unclean_shutdown().await? {
            tracing::warn!(
                "Previous session did not shut down cleanly; queued torrents from it were lost"
            );
        }
        db.set_clean_start().await?;

        let store: Arc<dyn TorrentStore> = db.clone();
        Self::build(config, client, store, Some(db))
    }

    /// Build a pipeline on an arbitrary store
    ///
    /// Spawns the retry worker, so this must be called from within a Tokio runtime.
    pub fn with_store(
        config: Config,
        client: Arc<dyn DownloadClient>,
        store: Arc<dyn TorrentStore>,
    ) -> Result<Self> {
        config.validate()?;
        Self::build(config, client, store, None)
    }

    fn build(
        config: Config,
        client: Arc<dyn DownloadClient>,
        store: Arc<dyn TorrentStore>,
        db: Option<Arc<Database>>,
    ) -> Result<Self> {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let state = PipelineState {
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            cycle_lock: Arc::new(tokio::sync::Mutex::new(())),
            pending_persistence: Arc::new(std::sync::Mutex::new(Vec::new())),
            retry_tx,
            retry_worker: Arc::new(std::sync::Mutex::new(None)),
        };

        let pipeline = Self {
            queue: Arc::new(BatchQueue::from_config(&config.queue)),
            client,
            store,
            db,
            config: Arc::new(config),
            event_tx,
            state,
        };

        let worker = pipeline.spawn_retry_worker(retry_rx);
        *lock_unpoisoned(&pipeline.state.retry_worker) = Some(worker);

        tracing::info!(
            client = pipeline.client.name(),
            batch_size = pipeline.config.queue.batch_size,
            min_batch_threshold = pipeline.config.queue.min_batch_threshold,
            threshold_timeout_secs = pipeline.config.queue.threshold_timeout.map(|t| t.as_secs_f64()),
            "Download pipeline initialized"
        );

        Ok(pipeline)
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls behind by
    /// more than 1000 events receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The shared queue
    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    /// Queue counters
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// The SQLite database, if the pipeline was created with [`open`](Self::open)
    pub fn database(&self) -> Option<&Arc<Database>> {
        self.db.as_ref()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Number of submitted torrents waiting for a store retry
    pub fn pending_persistence(&self) -> usize {
        lock_unpoisoned(&self.state.pending_persistence).len()
    }

    /// Emit an event to all subscribers
    ///
    /// Without subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked
pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
