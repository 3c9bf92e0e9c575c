//! Trait for submitting torrents to a download backend

use crate::error::DispatchError;
use crate::types::{SeriesDescriptor, Submission, TorrentDescriptor};
use async_trait::async_trait;

/// Submits a single torrent to a download backend
///
/// A drain cycle calls `submit` concurrently for every torrent in the batch, so
/// implementations must tolerate parallel calls.
///
/// Errors are classified so the retry worker can decide what to do with them:
/// [`DispatchError::Unauthorized`] and [`DispatchError::Rejected`] are final,
/// [`DispatchError::Transient`] is retried with backoff.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use bangumi_dispatch::client::DownloadClient;
/// use bangumi_dispatch::error::DispatchError;
/// use bangumi_dispatch::types::{SeriesDescriptor, Submission, TorrentDescriptor};
///
/// struct MagnetOnly;
///
/// #[async_trait]
/// impl DownloadClient for MagnetOnly {
///     async fn submit(
///         &self,
///         torrent: &TorrentDescriptor,
///         _series: &SeriesDescriptor,
///     ) -> Result<Submission, DispatchError> {
///         if torrent.url.starts_with("magnet:") {
///             Ok(Submission::default())
///         } else {
///             Err(DispatchError::Rejected(format!("not a magnet link: {}", torrent.url)))
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "magnet-only"
///     }
/// }
/// ```
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Add `torrent` to the backend, saving into the series' directory
    async fn submit(
        &self,
        torrent: &TorrentDescriptor,
        series: &SeriesDescriptor,
    ) -> Result<Submission, DispatchError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
