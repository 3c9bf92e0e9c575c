use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut conn = db.pool.acquire().await.unwrap();
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"torrents".to_string()));
    assert!(tables.contains(&"dead_letters".to_string()));
    assert!(tables.contains(&"runtime_state".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_schema_version_is_latest() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert_eq!(db.schema_version().await.unwrap(), 2);

    db.close().await;
}

#[tokio::test]
async fn test_reopening_does_not_rerun_migrations() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.insert_torrents(&[crate::types::TorrentDescriptor::new(
            "[SubsPlease] Frieren - 01",
            "magnet:?xt=urn:btih:01",
        )])
        .await
        .unwrap();
        db.close().await;
    }

    // A second migration run would fail on CREATE TABLE or lose rows
    let db = Database::new(temp_file.path()).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), 2);
    assert_eq!(db.count_torrents().await.unwrap(), 1);

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1, 2]);

    db.close().await;
}

#[tokio::test]
async fn test_creates_missing_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("state").join("dispatch.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());

    db.close().await;
}
