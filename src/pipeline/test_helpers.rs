//! Shared test doubles for pipeline tests.

use crate::client::DownloadClient;
use crate::config::{Config, RetryConfig};
use crate::db::NewDeadLetter;
use crate::error::{DatabaseError, DispatchError, Error, Result};
use crate::pipeline::DownloadPipeline;
use crate::store::TorrentStore;
use crate::types::{SeriesDescriptor, Submission, TorrentDescriptor};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Download client that records every call and replays scripted outcomes
///
/// Torrents without a script use the default outcome: accepted with hash `hash-<name>`, or
/// the error passed to [`RecordingClient::failing`].
#[derive(Default)]
pub(crate) struct RecordingClient {
    default_error: Option<DispatchError>,
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<(), DispatchError>>>>,
    calls: Mutex<Vec<String>>,
    accepted: Mutex<Vec<String>>,
}

impl RecordingClient {
    pub(crate) fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(error: DispatchError) -> Arc<Self> {
        Arc::new(Self {
            default_error: Some(error),
            ..Self::default()
        })
    }

    /// Queue outcomes for one torrent; once used up the default applies
    pub(crate) fn script(&self, name: &str, outcomes: Vec<std::result::Result<(), DispatchError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), outcomes.into());
    }

    /// Names of every torrent submitted, in call order, including failed calls
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|n| *n == name).count()
    }

    /// Names of torrents the client accepted
    pub(crate) fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadClient for RecordingClient {
    async fn submit(
        &self,
        torrent: &TorrentDescriptor,
        _series: &SeriesDescriptor,
    ) -> std::result::Result<Submission, DispatchError> {
        self.calls.lock().unwrap().push(torrent.name.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&torrent.name)
            .and_then(|outcomes| outcomes.pop_front());
        let outcome = match scripted {
            Some(outcome) => outcome,
            None => match &self.default_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
        };

        outcome.map(|()| {
            self.accepted.lock().unwrap().push(torrent.name.clone());
            Submission {
                hash: Some(format!("hash-{}", torrent.name)),
            }
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Store that keeps every call in memory and can be told to fail
#[derive(Default)]
pub(crate) struct RecordingStore {
    batches: Mutex<Vec<Vec<TorrentDescriptor>>>,
    dead_letters: Mutex<Vec<NewDeadLetter>>,
    failing: AtomicBool,
    failed_calls: AtomicUsize,
}

impl RecordingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful `add_all` calls, in order
    pub(crate) fn batches(&self) -> Vec<Vec<TorrentDescriptor>> {
        self.batches.lock().unwrap().clone()
    }

    /// Names of every persisted torrent, in order
    pub(crate) fn persisted_names(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flatten()
            .map(|t| t.name)
            .collect()
    }

    pub(crate) fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn dead_letters(&self) -> Vec<NewDeadLetter> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl TorrentStore for RecordingStore {
    async fn add_all(&self, torrents: &[TorrentDescriptor]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Database(DatabaseError::QueryFailed(
                "database is locked".to_string(),
            )));
        }
        self.batches.lock().unwrap().push(torrents.to_vec());
        Ok(())
    }

    async fn record_dead_letter(&self, letter: &NewDeadLetter) -> Result<()> {
        self.dead_letters.lock().unwrap().push(letter.clone());
        Ok(())
    }
}

/// Default batching (threshold 10, batch 5) without a threshold timeout and with
/// millisecond retry delays
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.queue.threshold_timeout = None;
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
        retry_failed: true,
    };
    config
}

/// Build a pipeline on in-memory test doubles
pub(crate) fn create_test_pipeline(
    config: Config,
    client: Arc<RecordingClient>,
) -> (DownloadPipeline, Arc<RecordingStore>) {
    let store = RecordingStore::new();
    let pipeline = DownloadPipeline::with_store(config, client, store.clone()).unwrap();
    (pipeline, store)
}

pub(crate) fn series() -> SeriesDescriptor {
    SeriesDescriptor::new("Sousou no Frieren", "/downloads/Sousou no Frieren/Season 1")
}

/// Torrents named `T<n>` for every n in `range`
pub(crate) fn torrents(range: std::ops::RangeInclusive<u32>) -> Vec<TorrentDescriptor> {
    range
        .map(|n| {
            TorrentDescriptor::new(
                format!("T{}", n),
                format!("magnet:?xt=urn:btih:{:040}", n),
            )
        })
        .collect()
}

pub(crate) fn names(torrents: &[TorrentDescriptor]) -> Vec<String> {
    torrents.iter().map(|t| t.name.clone()).collect()
}

/// Poll `condition` until it holds, failing the test after five seconds
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5 seconds");
}
