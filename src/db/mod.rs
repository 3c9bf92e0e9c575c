//! Database layer for bangumi-dispatch
//!
//! Handles SQLite persistence for submitted torrents and dead-lettered submissions.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`torrents`] - Bulk insert and lookup of submitted torrents
//! - [`dead_letters`] - Failed submissions kept for manual or automatic retry
//! - [`state`] - Runtime state (shutdown tracking)

use crate::types::{SeriesDescriptor, SeriesId, TorrentDescriptor};
use sqlx::{FromRow, sqlite::SqlitePool};

mod dead_letters;
mod migrations;
mod state;
mod torrents;

/// Torrent record from database
#[derive(Debug, Clone, FromRow)]
pub struct TorrentRow {
    /// Unique database ID
    pub id: i64,
    /// Release name
    pub name: String,
    /// Torrent or magnet URL
    pub url: String,
    /// Release page
    pub homepage: Option<String>,
    /// Info-hash reported by the download client
    pub hash: Option<String>,
    /// Owning series id
    pub series_id: Option<i64>,
    /// Feed the torrent was discovered in
    pub rss_id: Option<i64>,
    /// Unix timestamp when the record was written
    pub created_at: i64,
}

impl From<TorrentRow> for TorrentDescriptor {
    fn from(row: TorrentRow) -> Self {
        TorrentDescriptor {
            name: row.name,
            url: row.url,
            homepage: row.homepage,
            hash: row.hash,
            series_id: row.series_id.map(SeriesId),
            rss_id: row.rss_id,
        }
    }
}

/// Failed submission to be recorded for later inspection or retry
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    /// Torrent that could not be submitted
    pub torrent: TorrentDescriptor,
    /// Series it belongs to
    pub series: SeriesDescriptor,
    /// Number of submission attempts made
    pub attempts: u32,
    /// Machine-readable error code of the last failure
    pub error_kind: String,
    /// Message of the last failure
    pub error_message: String,
}

/// Dead-letter record from database
#[derive(Debug, Clone, FromRow)]
pub struct DeadLetterRow {
    /// Unique database ID
    pub id: i64,
    /// Release name
    pub name: String,
    /// Torrent or magnet URL
    pub url: String,
    /// Series title at the time of failure
    pub series_title: String,
    /// JSON-encoded [`TorrentDescriptor`]
    pub torrent_json: String,
    /// JSON-encoded [`SeriesDescriptor`]
    pub series_json: String,
    /// Number of submission attempts made
    pub attempts: i64,
    /// Machine-readable error code of the last failure
    pub error_kind: String,
    /// Message of the last failure
    pub error_message: String,
    /// Unix timestamp when the submission was given up on
    pub failed_at: i64,
}

impl DeadLetterRow {
    /// Decode the stored torrent and series so the pair can be enqueued again
    pub fn decode(&self) -> crate::Result<(TorrentDescriptor, SeriesDescriptor)> {
        let torrent = serde_json::from_str(&self.torrent_json)?;
        let series = serde_json::from_str(&self.series_json)?;
        Ok((torrent, series))
    }
}

/// Database handle for bangumi-dispatch
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
