//! FIFO batch queue with derived readiness signals
//!
//! [`BatchQueue`] holds [`WorkItem`]s between the producers (feed ingestion) and the single
//! drain controller. Every mutation re-evaluates the `threshold_reached` signal against the
//! new length, so the signal always reflects the queue as of the last enqueue or dequeue.
//!
//! Enqueue and dequeue never block. The lock is a plain [`std::sync::Mutex`] and is never
//! held across an `.await`.

use crate::config::{OverflowPolicy, QueueConfig};
use crate::error::{Error, Result};
use crate::signal::{ReadinessSignal, ReadinessSignals};
use crate::types::{QueueStats, WorkItem};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<WorkItem>,
    total_enqueued: u64,
    total_dequeued: u64,
    total_evicted: u64,
}

/// Shared FIFO of torrents waiting to be submitted
#[derive(Debug)]
pub struct BatchQueue {
    inner: Mutex<QueueInner>,
    signals: ReadinessSignals,
    min_batch_threshold: usize,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
}

impl BatchQueue {
    /// Create an unbounded queue that reports readiness once it holds more than
    /// `min_batch_threshold` items
    pub fn new(min_batch_threshold: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            signals: ReadinessSignals::default(),
            min_batch_threshold,
            capacity: None,
            overflow: OverflowPolicy::default(),
        }
    }

    /// Create a queue from the `queue` section of the configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            capacity: config.capacity,
            overflow: config.overflow,
            ..Self::new(config.min_batch_threshold)
        }
    }

    /// Append a torrent to the tail of the queue
    ///
    /// Sets `has_arrivals` and re-evaluates `threshold_reached`. When the queue is capped and
    /// full, the overflow policy either rejects the item with [`Error::QueueFull`] or evicts
    /// the oldest queued item, which is returned.
    pub fn enqueue(&self, item: WorkItem) -> Result<Option<WorkItem>> {
        let mut inner = self.lock();
        self.check_room(&inner, 1)?;
        self.push(&mut inner, item);
        let evicted = self.evict_overflow(&mut inner).pop();
        self.refresh_threshold(inner.items.len());
        Ok(evicted)
    }

    /// Append several torrents as one contiguous run
    ///
    /// Items from one call are never interleaved with another producer's items. Under the
    /// reject policy the whole call fails if the run does not fit. Under the drop-oldest
    /// policy the queue never ends up above its capacity: a run longer than the capacity
    /// keeps only its newest items, and the dropped ones are returned with the other evictions.
    pub fn enqueue_all(&self, items: Vec<WorkItem>) -> Result<Vec<WorkItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.lock();
        self.check_room(&inner, items.len())?;
        for item in items {
            self.push(&mut inner, item);
        }
        let evicted = self.evict_overflow(&mut inner);
        self.refresh_threshold(inner.items.len());
        Ok(evicted)
    }

    /// Pop the head of the queue without waiting
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        let mut inner = self.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            inner.total_dequeued += 1;
        }
        self.refresh_threshold(inner.items.len());
        item
    }

    /// Pop up to `max` items from the head, stopping early if the queue empties
    pub fn drain_batch(&self, max: usize) -> Vec<WorkItem> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        while batch.len() < max {
            match self.try_dequeue() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Number of queued torrents
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Length the queue must exceed before `threshold_reached` is set
    pub fn min_batch_threshold(&self) -> usize {
        self.min_batch_threshold
    }

    /// Maximum number of queued torrents, if capped
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Signal set whenever an item is enqueued
    pub fn has_arrivals(&self) -> &ReadinessSignal {
        &self.signals.has_arrivals
    }

    /// Signal set while the queue holds more than the minimum
    pub fn threshold_reached(&self) -> &ReadinessSignal {
        &self.signals.threshold_reached
    }

    /// Snapshot of queue counters
    pub fn stats(&self) -> QueueStats {
        let inner = self.lock();
        QueueStats {
            len: inner.items.len(),
            total_enqueued: inner.total_enqueued,
            total_dequeued: inner.total_dequeued,
            total_evicted: inner.total_evicted,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // Every critical section leaves the deque consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, inner: &mut QueueInner, item: WorkItem) {
        tracing::debug!(
            series = %item.series.official_title,
            torrent = %item.torrent.name,
            url = %item.torrent.url,
            "Torrent added to download queue"
        );
        inner.items.push_back(item);
        inner.total_enqueued += 1;
        self.signals.has_arrivals.set();
    }

    /// Fail with [`Error::QueueFull`] if `incoming` more items do not fit under the reject policy
    fn check_room(&self, inner: &QueueInner, incoming: usize) -> Result<()> {
        let Some(capacity) = self.capacity else {
            return Ok(());
        };
        if self.overflow == OverflowPolicy::Reject && inner.items.len() + incoming > capacity {
            tracing::warn!(
                capacity,
                queued = inner.items.len(),
                incoming,
                "Download queue full, rejecting torrents"
            );
            return Err(Error::QueueFull { capacity });
        }
        Ok(())
    }

    /// Evict from the head until the queue is back within its capacity
    fn evict_overflow(&self, inner: &mut QueueInner) -> Vec<WorkItem> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };
        let excess = inner.items.len().saturating_sub(capacity);
        if excess == 0 {
            return Vec::new();
        }

        let evicted: Vec<WorkItem> = inner.items.drain(..excess).collect();
        inner.total_evicted += evicted.len() as u64;
        for item in &evicted {
            tracing::warn!(
                torrent = %item.torrent.name,
                capacity,
                "Download queue full, evicted oldest torrent"
            );
        }
        evicted
    }

    fn refresh_threshold(&self, len: usize) {
        self.signals
            .threshold_reached
            .set_to(len > self.min_batch_threshold);
    }
}
