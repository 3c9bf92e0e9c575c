//! Series and torrent fixtures

use bangumi_dispatch::{Config, Database, SeriesDescriptor, SeriesId, TorrentDescriptor};
use std::path::Path;
use std::time::Duration;

/// Upper bound for background work to show up in the database
const WAIT: Duration = Duration::from_secs(10);

/// Configuration that drains every queued torrent right away and retries without delay
pub fn eager_config(db_path: &Path) -> Config {
    let json = serde_json::json!({
        "queue": {
            "min_batch_threshold": 0,
            "batch_size": 5,
            "threshold_timeout": null
        },
        "retry": {
            "max_attempts": 3,
            "initial_delay": 0,
            "max_delay": 0,
            "jitter": false
        },
        "persistence": {
            "database_path": db_path
        }
    });
    serde_json::from_value(json).unwrap()
}

/// Series stored with the given database id
pub fn series(id: i64, title: &str) -> SeriesDescriptor {
    let mut series = SeriesDescriptor::new(title, format!("/downloads/{}/Season 1", title));
    series.id = Some(SeriesId(id));
    series
}

/// Episodes `range` of a series, with the episode number as feed id
pub fn episodes(
    series: &SeriesDescriptor,
    range: std::ops::RangeInclusive<i64>,
) -> Vec<TorrentDescriptor> {
    range
        .map(|n| {
            let mut torrent = TorrentDescriptor::new(
                format!("[LoliHouse] {} - {:02} [WebRip 1080p]", series.official_title, n),
                format!(
                    "https://mikanani.me/Download/{}/{:02}.torrent",
                    series.official_title.replace(' ', "_"),
                    n
                ),
            )
            .with_homepage(format!("https://mikanani.me/Home/Episode/{:02}", n))
            .with_rss_id(n);
            if let Some(id) = series.id {
                torrent = torrent.with_series_id(id);
            }
            torrent
        })
        .collect()
}

/// Wait until the `torrents` table holds `count` rows
pub async fn wait_for_torrents(db: &Database, count: i64) {
    let waited = tokio::time::timeout(WAIT, async {
        while db.count_torrents().await.unwrap() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "expected {} torrent records", count);
}

/// Wait until the `dead_letters` table holds `count` rows
pub async fn wait_for_dead_letters(db: &Database, count: usize) {
    let waited = tokio::time::timeout(WAIT, async {
        while db.list_dead_letters().await.unwrap().len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "expected {} dead letters", count);
}
