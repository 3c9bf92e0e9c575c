//! Producer entrypoint.

use crate::error::{Error, Result};
use crate::types::{Event, SeriesDescriptor, TorrentDescriptor, WorkItem};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::DownloadPipeline;

impl DownloadPipeline {
    /// Queue torrents of one series for download
    ///
    /// The torrents are appended in the given order as one contiguous run and share a single
    /// series allocation. Never waits: readiness is signalled to the drain controller, which
    /// decides when to submit.
    ///
    /// Returns the number of torrents that stayed queued. With a capped drop-oldest queue this
    /// is at most the capacity, since a longer run keeps only its newest torrents.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    /// - [`Error::QueueFull`] when the queue is capped, full, and configured to reject
    pub fn enqueue_torrents(
        &self,
        torrents: Vec<TorrentDescriptor>,
        series: impl Into<Arc<SeriesDescriptor>>,
    ) -> Result<usize> {
        if !self.state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if torrents.is_empty() {
            return Ok(0);
        }

        let series: Arc<SeriesDescriptor> = series.into();
        let count = match self.queue.capacity() {
            Some(capacity) => torrents.len().min(capacity),
            None => torrents.len(),
        };
        let items = torrents
            .into_iter()
            .map(|torrent| WorkItem::new(torrent, Arc::clone(&series)))
            .collect();

        let evicted = self.queue.enqueue_all(items)?;
        for item in evicted {
            self.emit_event(Event::Evicted {
                name: item.torrent.name,
            });
        }

        tracing::info!(
            series = %series.official_title,
            count,
            queue_len = self.queue.len(),
            "Torrents queued for download"
        );
        self.emit_event(Event::Queued {
            series: series.official_title.clone(),
            count,
        });

        Ok(count)
    }
}
