//! Download clients with controllable behaviour

use async_trait::async_trait;
use bangumi_dispatch::{DispatchError, DownloadClient, SeriesDescriptor, Submission, TorrentDescriptor};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Client that fails the first submission of every torrent whose episode number is even
///
/// Resubmissions succeed, so every torrent is eventually accepted.
#[derive(Default)]
pub struct FlakyClient {
    seen: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FlakyClient {
    /// Total number of submit calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadClient for FlakyClient {
    async fn submit(
        &self,
        torrent: &TorrentDescriptor,
        _series: &SeriesDescriptor,
    ) -> Result<Submission, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first_try = self.seen.lock().unwrap().insert(torrent.url.clone());
        let even = torrent.rss_id.is_some_and(|n| n % 2 == 0);
        if first_try && even {
            return Err(DispatchError::Transient("502 Bad Gateway".to_string()));
        }
        Ok(Submission {
            hash: Some(format!("{:x}", torrent.url.len() * 31 + torrent.name.len())),
        })
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Client that rejects credentials until it is logged in
#[derive(Default)]
pub struct LoginClient {
    logged_in: AtomicBool,
}

impl LoginClient {
    /// Accept submissions from now on
    pub fn log_in(&self) {
        self.logged_in.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DownloadClient for LoginClient {
    async fn submit(
        &self,
        _torrent: &TorrentDescriptor,
        _series: &SeriesDescriptor,
    ) -> Result<Submission, DispatchError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(Submission::default())
        } else {
            Err(DispatchError::Unauthorized("403 Forbidden".to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "login"
    }
}
