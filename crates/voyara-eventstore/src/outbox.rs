use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use voyara_core::{DomainEvent, EventPublisher, EventSink};

#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn spawn(sink: Arc<dyn EventSink>) -> (Self, JoinHandle<()>) {
        let (outbox, receiver) = Self::channel();
        let handle = tokio::spawn(forward_events(receiver, sink));
        (outbox, handle)
    }
}

impl EventPublisher for Outbox {
    fn publish(&self, event: DomainEvent) {
        let kind = event.kind;
        if self.sender.send(event).is_err() {
            warn!(?kind, "outbox receiver closed; dropping event");
        }
    }
}

pub async fn forward_events(
    mut receiver: mpsc::UnboundedReceiver<DomainEvent>,
    sink: Arc<dyn EventSink>,
) {
    while let Some(event) = receiver.recv().await {
        match sink.deliver(&event).await {
            Ok(()) => debug!(event_id = %event.id, kind = ?event.kind, "event delivered"),
            Err(err) => warn!(
                event_id = %event.id,
                kind = ?event.kind,
                "event delivery failed: {err:#}"
            ),
        }
    }
}
