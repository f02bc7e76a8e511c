pub mod events;
pub mod metrics;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub use events::SendEvent;
pub use metrics::{MetricsSnapshot, QueueMetrics};

const EVENT_CAPACITY: usize = 1024;

/// Event broadcaster plus live counters, shared by every part of a queue
#[derive(Debug)]
pub struct ObservabilityLayer {
    events: broadcast::Sender<SendEvent>,
    metrics: QueueMetrics,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            metrics: QueueMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SendEvent> {
        self.events.subscribe()
    }

    pub fn event_stream(&self) -> BroadcastStream<SendEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    fn publish(&self, event: SendEvent) {
        // No subscribers is the common case.
        let _ = self.events.send(event);
    }

    pub(crate) fn record_group_created(&self, group: u64, limit: Option<usize>) {
        self.metrics.increment_groups_created();
        self.publish(SendEvent::GroupCreated {
            group,
            limit,
            at: Utc::now(),
        });
    }

    pub(crate) fn record_accepted(&self) {
        self.metrics.increment_accepted();
    }

    pub(crate) fn record_rejected(&self) {
        self.metrics.increment_rejected();
        self.publish(SendEvent::Rejected { at: Utc::now() });
    }

    pub(crate) fn record_started(&self, group: u64, pending: u64) {
        self.publish(SendEvent::Started {
            group,
            pending,
            at: Utc::now(),
        });
    }

    pub(crate) fn record_finished(&self, group: u64, pending: u64, ok: bool, panicked: bool) {
        match (ok, panicked) {
            (true, _) => self.metrics.increment_succeeded(),
            (false, true) => self.metrics.increment_panicked(),
            (false, false) => self.metrics.increment_failed(),
        }
        self.publish(SendEvent::Finished {
            group,
            pending,
            ok,
            at: Utc::now(),
        });
    }

    pub(crate) fn record_group_cancelled(&self, group: u64) {
        self.metrics.increment_groups_cancelled();
        self.publish(SendEvent::GroupCancelled {
            group,
            at: Utc::now(),
        });
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
///
/// Meant for binaries and demos; libraries embedding the queue should set up
/// their own subscriber.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() -> crate::QueueResult<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|e| crate::QueueError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let layer = ObservabilityLayer::new();
        let mut rx = layer.subscribe();

        layer.record_group_created(1, Some(2));
        layer.record_started(1, 1);
        layer.record_finished(1, 0, false, false);
        layer.record_group_cancelled(1);

        let names: Vec<&str> = (0..4)
            .map(|_| rx.try_recv().expect("event published"))
            .map(|e| e.event_name())
            .collect();
        assert_eq!(names, ["group_created", "started", "finished", "group_cancelled"]);

        let snapshot = layer.metrics().snapshot();
        assert_eq!(snapshot.groups_created, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.groups_cancelled, 1);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let layer = ObservabilityLayer::new();
        layer.record_rejected();
        assert_eq!(layer.metrics().snapshot().rejected, 1);
    }
}
