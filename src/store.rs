//! Persistence interface consumed by the drain controller
//!
//! [`TorrentStore`] is the only persistence the pipeline needs: a bulk insert of drained
//! torrents and a place to record submissions that were given up on. [`Database`] is the
//! SQLite implementation; applications with their own schema implement the trait instead.

use crate::db::{Database, NewDeadLetter};
use crate::error::Result;
use crate::types::TorrentDescriptor;
use async_trait::async_trait;

/// Bulk persistence of torrent records
#[async_trait]
pub trait TorrentStore: Send + Sync {
    /// Persist every torrent in `torrents`
    ///
    /// Implementations should be atomic: on error nothing is written, so the pipeline can
    /// retry the same slice later.
    async fn add_all(&self, torrents: &[TorrentDescriptor]) -> Result<()>;

    /// Record a submission that will not be attempted again automatically
    async fn record_dead_letter(&self, letter: &NewDeadLetter) -> Result<()>;
}

#[async_trait]
impl TorrentStore for Database {
    async fn add_all(&self, torrents: &[TorrentDescriptor]) -> Result<()> {
        self.insert_torrents(torrents).await
    }

    async fn record_dead_letter(&self, letter: &NewDeadLetter) -> Result<()> {
        self.insert_dead_letter(letter).await.map(|_| ())
    }
}
