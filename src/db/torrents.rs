//! Bulk insert and lookup of submitted torrents.

use crate::error::DatabaseError;
use crate::types::{SeriesId, TorrentDescriptor};
use crate::{Error, Result};

use super::{Database, TorrentRow};

impl Database {
    /// Insert torrent records in a single transaction
    ///
    /// Either every record is written or none is, so a failed call can be retried with the
    /// same slice without creating partial duplicates.
    pub async fn insert_torrents(&self, torrents: &[TorrentDescriptor]) -> Result<()> {
        if torrents.is_empty() {
            return Ok(());
        }

        // SQLite default SQLITE_MAX_VARIABLE_NUMBER is 999; each torrent uses 7 bind variables.
        const MAX_TORRENTS_PER_STATEMENT: usize = 140;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for chunk in torrents.chunks(MAX_TORRENTS_PER_STATEMENT) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO torrents (name, url, homepage, hash, series_id, rss_id, created_at) ",
            );

            query_builder.push_values(chunk, |mut b, torrent| {
                b.push_bind(&torrent.name)
                    .push_bind(&torrent.url)
                    .push_bind(&torrent.homepage)
                    .push_bind(&torrent.hash)
                    .push_bind(torrent.series_id.map(i64::from))
                    .push_bind(torrent.rss_id)
                    .push_bind(now);
            });

            query_builder.build().execute(&mut *tx).await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert torrents: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit torrents: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List all torrent records in insertion order
    pub async fn list_torrents(&self) -> Result<Vec<TorrentRow>> {
        let rows = sqlx::query_as::<_, TorrentRow>(
            r#"
            SELECT id, name, url, homepage, hash, series_id, rss_id, created_at
            FROM torrents
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list torrents: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List torrent records belonging to a series
    pub async fn list_torrents_for_series(&self, series_id: SeriesId) -> Result<Vec<TorrentRow>> {
        let rows = sqlx::query_as::<_, TorrentRow>(
            r#"
            SELECT id, name, url, homepage, hash, series_id, rss_id, created_at
            FROM torrents
            WHERE series_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(series_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list torrents for series: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Find the most recent torrent record with the given URL
    ///
    /// Producers use this to avoid enqueueing a torrent that was already submitted.
    pub async fn find_torrent_by_url(&self, url: &str) -> Result<Option<TorrentRow>> {
        let row = sqlx::query_as::<_, TorrentRow>(
            r#"
            SELECT id, name, url, homepage, hash, series_id, rss_id, created_at
            FROM torrents
            WHERE url = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find torrent: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Number of stored torrent records
    pub async fn count_torrents(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM torrents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count torrents: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
