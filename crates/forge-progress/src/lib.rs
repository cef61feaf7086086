//! Component C2: typed pub/sub of progress events, keyed by job id,
//! over an in-memory broker (`spec.md` §4.2).
//!
//! One `tokio::sync::broadcast` channel per job id, partitioned by a
//! `DashMap` (generalized from the single global-channel shape of a
//! job-progress broadcaster seen in the retrieval corpus to the
//! per-job-id keyspace `spec.md` §4.2 requires). `publish` never
//! blocks and never fails the caller; `subscribe` starts a fresh
//! subscription that only sees events published after it connects.

use std::pin::Pin;

use dashmap::DashMap;
use forge_types::ProgressEvent;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Bounded per-job channel capacity. A slow subscriber that falls this
/// far behind starts missing events (`spec.md` §4.2: "no back-pressure
/// toward C4"); the relay treats a lagged subscriber as having missed
/// events, which is within spec since clients fall back to `get_job`.
const CHANNEL_CAPACITY: usize = 256;

pub struct ProgressStream {
    inner: Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[derive(Default)]
pub struct ProgressBus {
    channels: DashMap<i64, broadcast::Sender<ProgressEvent>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Fire-and-forget publish. Lazily creates the per-job channel if
    /// this is the first event for `event.job_id`. A `SendError`
    /// (nobody subscribed) is expected and swallowed.
    pub fn publish(&self, event: ProgressEvent) {
        let job_id = event.job_id;
        let sender = self
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();

        if sender.send(event).is_err() {
            tracing::debug!(job_id, "progress event published with no subscribers");
        }

        // Lazy GC: if nobody is listening right after this publish,
        // drop the channel so memory doesn't grow unbounded over the
        // life of a long-running server.
        self.channels
            .remove_if(&job_id, |_, s| s.receiver_count() == 0);
    }

    /// Subscribe to events for a single job id. Only sees events
    /// published after this call returns.
    pub fn subscribe(&self, job_id: i64) -> ProgressStream {
        let sender = self
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();

        let receiver = sender.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| item.ok());
        ProgressStream {
            inner: Box::pin(stream),
        }
    }

    /// Number of job ids with at least one live channel. Exposed for
    /// tests and diagnostics only.
    pub fn active_channel_count(&self) -> usize {
        self.channels.len()
    }
}
