//! # bangumi-dispatch
//!
//! Batching dispatch pipeline between anime feed ingestion and a torrent download client.
//!
//! Feed ingestion discovers torrents in bursts: a new season can add dozens of releases in
//! a single poll. Producers hand those torrents to a [`DownloadPipeline`], which queues them
//! and lets a single drain controller submit them in small concurrent batches once enough
//! have accumulated, then records the submitted torrents in SQLite.
//!
//! ## Overview
//!
//! - [`queue::BatchQueue`] - FIFO queue with `has_arrivals` / `threshold_reached` signals
//! - [`DownloadPipeline`] - producer entrypoint, drain cycle, retry worker, shutdown
//! - [`client::DownloadClient`] - the download backend (qBittorrent, Transmission, ...)
//! - [`store::TorrentStore`] - bulk persistence, implemented by [`Database`]
//! - [`Event`] - broadcast notifications for every queue and dispatch step
//!
//! ## Quick Start
//!
//! ```no_run
//! use bangumi_dispatch::client::DryRunClient;
//! use bangumi_dispatch::types::{SeriesDescriptor, TorrentDescriptor};
//! use bangumi_dispatch::{Config, DownloadPipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = DownloadPipeline::open(Config::default(), Arc::new(DryRunClient)).await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let drain_loop = pipeline.spawn_drain_loop();
//!
//!     let series = SeriesDescriptor::new("Sousou no Frieren", "/downloads/Frieren/Season 1");
//!     let torrents = vec![
//!         TorrentDescriptor::new("[SubsPlease] Sousou no Frieren - 01", "magnet:?xt=urn:btih:01"),
//!         TorrentDescriptor::new("[SubsPlease] Sousou no Frieren - 02", "magnet:?xt=urn:btih:02"),
//!     ];
//!     pipeline.enqueue_torrents(torrents, series)?;
//!
//!     pipeline.shutdown().await?;
//!     drain_loop.await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Download client abstraction
pub mod client;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Download pipeline (decomposed into focused submodules)
pub mod pipeline;
/// FIFO batch queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Level-triggered readiness signals
pub mod signal;
/// Persistence interface used by the drain controller
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::{DownloadClient, DryRunClient};
pub use config::{Config, OverflowPolicy, PersistPolicy, QueueConfig, RetryConfig};
pub use db::Database;
pub use error::{DatabaseError, DispatchError, Error, Result};
pub use pipeline::DownloadPipeline;
pub use queue::BatchQueue;
pub use store::TorrentStore;
pub use types::{
    CycleReport, Event, QueueStats, SeriesDescriptor, SeriesId, Submission, TorrentDescriptor,
    WorkItem,
};

/// Run the drain loop until a termination signal arrives, then shut down gracefully.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to whichever handler could be
///   registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bangumi_dispatch::{Config, DownloadPipeline, DryRunClient, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = DownloadPipeline::open(Config::default(), Arc::new(DryRunClient)).await?;
///
///     // Hand `pipeline.clone()` to feed ingestion, then block here
///     run_with_shutdown(pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: DownloadPipeline) -> Result<()> {
    let drain_loop = pipeline.spawn_drain_loop();
    wait_for_signal().await;

    let result = pipeline.shutdown().await;
    if let Err(e) = drain_loop.await {
        tracing::error!(error = %e, "Drain loop panicked");
    }
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    } else {
        tracing::info!("Received Ctrl+C signal");
    }
}
