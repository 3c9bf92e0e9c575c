//! Core types for bangumi-dispatch
//!
//! Torrent and series descriptors, the queued [`WorkItem`], cycle reports and the [`Event`]s
//! broadcast by the pipeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a media series (the `bangumi` row owned by the surrounding application)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub i64);

impl From<i64> for SeriesId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<SeriesId> for i64 {
    fn from(id: SeriesId) -> Self {
        id.0
    }
}

/// A torrent discovered by feed ingestion and selected for download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentDescriptor {
    /// Release name as it appeared in the feed
    pub name: String,
    /// Torrent or magnet URL handed to the download client
    pub url: String,
    /// Release page on the tracker site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Info-hash reported by the download client after submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Owning series, when the producer knows its database id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<SeriesId>,
    /// Feed the torrent was discovered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss_id: Option<i64>,
}

impl TorrentDescriptor {
    /// Create a descriptor with only the required fields set
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            homepage: None,
            hash: None,
            series_id: None,
            rss_id: None,
        }
    }

    /// Set the release page
    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }

    /// Set the owning series id
    pub fn with_series_id(mut self, id: SeriesId) -> Self {
        self.series_id = Some(id);
        self
    }

    /// Set the feed the torrent came from
    pub fn with_rss_id(mut self, rss_id: i64) -> Self {
        self.rss_id = Some(rss_id);
        self
    }

    /// Copy of this descriptor carrying the hash the client reported
    pub(crate) fn submitted(&self, submission: &Submission) -> Self {
        let mut torrent = self.clone();
        if submission.hash.is_some() {
            torrent.hash = submission.hash.clone();
        }
        torrent
    }
}

/// The media series a torrent belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    /// Database id, if the series has been stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SeriesId>,
    /// Canonical title used for folder names and logs
    pub official_title: String,
    /// Directory the download client saves into
    pub save_path: String,
    /// Season number
    pub season: u32,
    /// Air year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Whether the full back catalogue has already been collected
    #[serde(default)]
    pub eps_collect: bool,
    /// Whether the subscription has been disabled
    #[serde(default)]
    pub deleted: bool,
}

impl SeriesDescriptor {
    /// Create a series descriptor for the first season with default flags
    pub fn new(official_title: impl Into<String>, save_path: impl Into<String>) -> Self {
        Self {
            id: None,
            official_title: official_title.into(),
            save_path: save_path.into(),
            season: 1,
            year: None,
            eps_collect: false,
            deleted: false,
        }
    }
}

/// One queued unit of work: a torrent and the series it belongs to
///
/// All items produced by one `enqueue_torrents` call share the same series allocation.
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// Torrent to submit
    pub torrent: TorrentDescriptor,
    /// Owning series
    pub series: Arc<SeriesDescriptor>,
}

impl WorkItem {
    /// Pair a torrent with its series
    pub fn new(torrent: TorrentDescriptor, series: Arc<SeriesDescriptor>) -> Self {
        Self { torrent, series }
    }
}

/// Acknowledgement returned by a download client for an accepted torrent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Info-hash assigned by the client, when it reports one
    pub hash: Option<String>,
}

/// Outcome of a single drain cycle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Torrents removed from the queue this cycle, in FIFO order
    pub drained: Vec<TorrentDescriptor>,
    /// Number of torrents the download client accepted
    pub submitted: usize,
    /// Number of torrents whose submission failed
    pub failed: usize,
    /// Number of torrent records written to the store
    pub persisted: usize,
    /// Number of torrent records waiting for a store retry after this cycle
    pub pending_persistence: usize,
    /// Store error if writing this cycle's records failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
    /// Whether the cycle drained early because the threshold wait timed out
    pub threshold_timed_out: bool,
}

impl CycleReport {
    /// Number of torrents drained this cycle
    pub fn batch_len(&self) -> usize {
        self.drained.len()
    }
}

/// Queue counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Torrents currently waiting
    pub len: usize,
    /// Torrents enqueued since the queue was created
    pub total_enqueued: u64,
    /// Torrents drained since the queue was created
    pub total_dequeued: u64,
    /// Torrents evicted by the drop-oldest overflow policy
    pub total_evicted: u64,
}

/// Event emitted during the pipeline lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Torrents for a series were added to the queue
    Queued {
        /// Series title
        series: String,
        /// Number of torrents enqueued
        count: usize,
    },

    /// A queued torrent was evicted to make room
    Evicted {
        /// Torrent name
        name: String,
    },

    /// A batch was removed from the queue
    BatchDrained {
        /// Number of torrents in the batch
        count: usize,
        /// Whether the threshold wait timed out
        timed_out: bool,
    },

    /// The download client accepted a torrent
    Submitted {
        /// Torrent name
        name: String,
        /// Info-hash, if reported
        #[serde(skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },

    /// The download client rejected a torrent
    DispatchFailed {
        /// Torrent name
        name: String,
        /// Machine-readable error code
        error_code: String,
        /// Error message
        error: String,
    },

    /// Torrent records were written to the store
    Persisted {
        /// Number of records
        count: usize,
    },

    /// Writing torrent records failed; they are kept for the next cycle
    PersistenceFailed {
        /// Number of records still pending
        count: usize,
        /// Error message
        error: String,
    },

    /// A failed torrent was given up on and recorded for manual retry
    DeadLettered {
        /// Torrent name
        name: String,
        /// Number of submission attempts made
        attempts: u32,
        /// Last error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
