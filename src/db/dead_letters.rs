//! Failed submissions kept for later inspection or retry.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, DeadLetterRow, NewDeadLetter};

impl Database {
    /// Record a submission that was given up on
    pub async fn insert_dead_letter(&self, letter: &NewDeadLetter) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let torrent_json = serde_json::to_string(&letter.torrent)?;
        let series_json = serde_json::to_string(&letter.series)?;

        let result = sqlx::query(
            r#"
            INSERT INTO dead_letters (
                name, url, series_title, torrent_json, series_json,
                attempts, error_kind, error_message, failed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&letter.torrent.name)
        .bind(&letter.torrent.url)
        .bind(&letter.series.official_title)
        .bind(torrent_json)
        .bind(series_json)
        .bind(i64::from(letter.attempts))
        .bind(&letter.error_kind)
        .bind(&letter.error_message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert dead letter: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Write back a dead letter that was removed, keeping its id and failure time
    pub async fn restore_dead_letter(&self, row: &DeadLetterRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                id, name, url, series_title, torrent_json, series_json,
                attempts, error_kind, error_message, failed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.url)
        .bind(&row.series_title)
        .bind(&row.torrent_json)
        .bind(&row.series_json)
        .bind(row.attempts)
        .bind(&row.error_kind)
        .bind(&row.error_message)
        .bind(row.failed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to restore dead letter: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List dead letters, oldest first
    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetterRow>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT
                id, name, url, series_title, torrent_json, series_json,
                attempts, error_kind, error_message, failed_at
            FROM dead_letters
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list dead letters: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Get a dead letter by ID
    pub async fn get_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRow>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT
                id, name, url, series_title, torrent_json, series_json,
                attempts, error_kind, error_message, failed_at
            FROM dead_letters
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get dead letter: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Remove a dead letter, typically after it has been enqueued again
    pub async fn delete_dead_letter(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete dead letter: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "dead letter {} not found",
                id
            ))));
        }

        Ok(())
    }
}
