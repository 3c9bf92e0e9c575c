//! Runtime state tracking: clean-shutdown detection.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

const CLEAN_SHUTDOWN_KEY: &str = "clean_shutdown";

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session never reached `set_clean_shutdown()`. Torrents
    /// that were queued or mid-submission at that point were lost; callers typically log a
    /// warning and let the next feed poll rediscover them.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(CLEAN_SHUTDOWN_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check shutdown state: {}",
                        e
                    )))
                })?;

        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the pipeline has started
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "false").await
    }

    /// Mark that the pipeline is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "true").await
    }

    async fn set_runtime_value(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update runtime state '{}': {}",
                key, e
            )))
        })?;

        Ok(())
    }
}
