//! Client that accepts every torrent without contacting a backend

use super::traits::DownloadClient;
use crate::error::DispatchError;
use crate::types::{SeriesDescriptor, Submission, TorrentDescriptor};
use async_trait::async_trait;

/// Download client that logs submissions and reports success
///
/// Useful for exercising feed rules without adding anything to the real client.
///
/// # Examples
///
/// ```
/// use bangumi_dispatch::client::{DownloadClient, DryRunClient};
/// use bangumi_dispatch::types::{SeriesDescriptor, TorrentDescriptor};
///
/// # #[tokio::main]
/// # async fn main() {
/// let client = DryRunClient;
/// let series = SeriesDescriptor::new("Frieren", "/downloads/Frieren/Season 1");
/// let torrent = TorrentDescriptor::new("Frieren - 01", "magnet:?xt=urn:btih:01");
///
/// let submission = client.submit(&torrent, &series).await.unwrap();
/// assert!(submission.hash.is_none());
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunClient;

#[async_trait]
impl DownloadClient for DryRunClient {
    async fn submit(
        &self,
        torrent: &TorrentDescriptor,
        series: &SeriesDescriptor,
    ) -> Result<Submission, DispatchError> {
        tracing::info!(
            series = %series.official_title,
            torrent = %torrent.name,
            save_path = %series.save_path,
            "Dry run: would submit torrent"
        );
        Ok(Submission::default())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
