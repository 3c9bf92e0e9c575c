use super::*;
use crate::client::DryRunClient;

fn immediate_config() -> crate::config::Config {
    let mut config = test_config();
    config.queue.min_batch_threshold = 0;
    config
}

#[tokio::test]
async fn test_transient_failure_is_retried_and_persisted() {
    let client = RecordingClient::accepting();
    client.script("T1", vec![Err(DispatchError::Transient("connection reset".into()))]);
    let (pipeline, store) = create_test_pipeline(immediate_config(), client.clone());

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    let report = pipeline.run_drain_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.persisted, 0);

    wait_until(|| store.persisted_names() == vec!["T1"]).await;
    assert_eq!(client.calls_for("T1"), 2);
    assert!(store.dead_letters().is_empty());

    let persisted = store.batches().concat();
    assert_eq!(persisted[0].hash.as_deref(), Some("hash-T1"));
}

#[tokio::test]
async fn test_exhausted_retries_are_dead_lettered() {
    let client = RecordingClient::failing(DispatchError::Transient("503".into()));
    let (pipeline, store) = create_test_pipeline(immediate_config(), client.clone());

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();

    wait_until(|| store.dead_letters().len() == 1).await;
    let dead = &store.dead_letters()[0];

    // Drain cycle attempt plus max_attempts (2) retries
    assert_eq!(dead.attempts, 3);
    assert_eq!(client.calls_for("T1"), 3);
    assert_eq!(dead.error_kind, "transient");
    assert_eq!(dead.series.official_title, "Sousou no Frieren");
    assert!(store.persisted_names().is_empty());
}

#[tokio::test]
async fn test_retry_disabled_dead_letters_transient_failures_immediately() {
    let mut config = immediate_config();
    config.retry.retry_failed = false;
    let client = RecordingClient::failing(DispatchError::Transient("timeout".into()));
    let (pipeline, store) = create_test_pipeline(config, client.clone());

    pipeline.enqueue_torrents(torrents(1..=2), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();

    let dead = store.dead_letters();
    assert_eq!(dead.len(), 2);
    assert!(dead.iter().all(|d| d.attempts == 1 && d.error_kind == "transient"));
    assert_eq!(client.calls().len(), 2);
}

#[tokio::test]
async fn test_all_drained_retry_success_is_not_persisted_twice() {
    let mut config = immediate_config();
    config.queue.persist = PersistPolicy::AllDrained;
    let client = RecordingClient::accepting();
    client.script("T1", vec![Err(DispatchError::Transient("busy".into()))]);
    let (pipeline, store) = create_test_pipeline(config, client.clone());

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    let report = pipeline.run_drain_cycle().await.unwrap();
    assert_eq!(report.persisted, 1);

    wait_until(|| client.accepted() == vec!["T1"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.persisted_names(), vec!["T1"]);
}

#[tokio::test]
async fn test_shutdown_dead_letters_retries_in_backoff() {
    let mut config = immediate_config();
    config.retry.initial_delay = Duration::from_secs(60);
    config.retry.max_delay = Duration::from_secs(60);
    let client = RecordingClient::accepting();
    client.script("T1", vec![Err(DispatchError::Transient("timeout".into()))]);
    let (pipeline, store) = create_test_pipeline(config, client.clone());

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown())
        .await
        .expect("shutdown must not wait out the backoff")
        .unwrap();

    let dead = store.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].error_kind, "shutting_down");
    assert_eq!(dead[0].attempts, 1);
    assert_eq!(client.calls_for("T1"), 1);
}

#[tokio::test]
async fn test_requeue_dead_letter_puts_torrent_back() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = immediate_config();
    config.persistence.database_path = temp_dir.path().join("dispatch.db");
    let client = RecordingClient::failing(DispatchError::Unauthorized("bad password".into()));
    let pipeline = DownloadPipeline::open(config, client).await.unwrap();
    let db = pipeline.database().unwrap().clone();

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();

    let letters = db.list_dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].error_kind, "unauthorized");

    pipeline.requeue_dead_letter(letters[0].id).await.unwrap();

    assert!(db.list_dead_letters().await.unwrap().is_empty());
    let item = pipeline.queue().try_dequeue().unwrap();
    assert_eq!(item.torrent.name, "T1");
    assert_eq!(item.series.official_title, "Sousou no Frieren");
}

#[tokio::test]
async fn test_requeue_failed_delete_leaves_nothing_queued() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = immediate_config();
    config.persistence.database_path = temp_dir.path().join("dispatch.db");
    let client = RecordingClient::failing(DispatchError::Unauthorized("bad password".into()));
    let pipeline = DownloadPipeline::open(config, client).await.unwrap();
    let db = pipeline.database().unwrap().clone();

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();
    let id = db.list_dead_letters().await.unwrap()[0].id;

    sqlx::query(
        "CREATE TRIGGER keep_dead_letters BEFORE DELETE ON dead_letters \
         BEGIN SELECT RAISE(ABORT, 'dead letters are read-only'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let result = pipeline.requeue_dead_letter(id).await;

    assert!(matches!(
        result,
        Err(Error::Database(crate::error::DatabaseError::QueryFailed(_)))
    ));
    assert!(pipeline.queue().is_empty(), "torrent must not be queued");
    assert_eq!(db.list_dead_letters().await.unwrap()[0].id, id);
}

#[tokio::test]
async fn test_requeue_refused_by_full_queue_restores_record() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = immediate_config();
    config.persistence.database_path = temp_dir.path().join("dispatch.db");
    config.queue.capacity = Some(1);
    config.queue.overflow = OverflowPolicy::Reject;
    let client = RecordingClient::failing(DispatchError::Unauthorized("bad password".into()));
    let pipeline = DownloadPipeline::open(config, client).await.unwrap();
    let db = pipeline.database().unwrap().clone();

    pipeline.enqueue_torrents(torrents(1..=1), series()).unwrap();
    pipeline.run_drain_cycle().await.unwrap();
    let original = db.list_dead_letters().await.unwrap().remove(0);

    pipeline.enqueue_torrents(torrents(2..=2), series()).unwrap();
    let result = pipeline.requeue_dead_letter(original.id).await;

    assert!(matches!(result, Err(Error::QueueFull { capacity: 1 })));
    assert_eq!(pipeline.queue().len(), 1);
    let letters = db.list_dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].id, original.id);
    assert_eq!(letters[0].failed_at, original.failed_at);
}

#[tokio::test]
async fn test_requeue_unknown_dead_letter_is_not_found() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.persistence.database_path = temp_dir.path().join("dispatch.db");
    let pipeline = DownloadPipeline::open(config, Arc::new(DryRunClient))
        .await
        .unwrap();

    let result = pipeline.requeue_dead_letter(42).await;
    assert!(matches!(
        result,
        Err(Error::Database(crate::error::DatabaseError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_requeue_without_database_is_config_error() {
    let (pipeline, _store) = create_test_pipeline(test_config(), RecordingClient::accepting());

    let result = pipeline.requeue_dead_letter(1).await;
    assert!(matches!(result, Err(Error::Config { .. })));
}
