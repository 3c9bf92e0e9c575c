use super::DownloadPipeline;
use super::test_helpers::{
    RecordingClient, create_test_pipeline, names, series, test_config, torrents, wait_until,
};
use crate::config::{OverflowPolicy, PersistPolicy};
use crate::error::{DispatchError, Error};
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;

mod retry_worker;

/// Collect every event currently buffered for `rx`
fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
