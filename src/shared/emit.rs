use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::events::PipelineEvent;

/// Destination for pipeline events. Emitting never blocks and never fails the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Forwards events over an unbounded channel to whoever drives the UI
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PipelineEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Event receiver dropped, discarding {}", e.0.name());
        }
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Keeps every event in memory. Handy for inspecting emission order.
#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("[RecordingSink] Mutex poisoned, recovering...");
                poisoned.into_inner()
            }
        };
        events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(PipelineEvent::HistoryUpdated { count: 1 });
        sink.emit(PipelineEvent::HistoryUpdated { count: 2 });
        assert_eq!(rx.recv().await, Some(PipelineEvent::HistoryUpdated { count: 1 }));
        assert_eq!(rx.recv().await, Some(PipelineEvent::HistoryUpdated { count: 2 }));
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(PipelineEvent::HistoryUpdated { count: 0 });
    }
}
