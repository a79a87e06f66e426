mod memory;
mod outbox;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use voyara_core::{DomainEvent, EventEnvelope, EventSink, EventStore};

pub use memory::InMemorySettlementStore;
pub use outbox::{Outbox, forward_events};

#[derive(Default)]
struct EventLog {
    last_sequence: i64,
    streams: HashMap<Uuid, Vec<EventEnvelope>>,
}

#[derive(Default)]
pub struct InMemoryEventStore {
    log: RwLock<EventLog>,
}

impl InMemoryEventStore {
    pub async fn all(&self) -> Vec<EventEnvelope> {
        let log = self.log.read().await;
        let mut envelopes: Vec<EventEnvelope> = log.streams.values().flatten().cloned().collect();
        envelopes.sort_by_key(|envelope| envelope.sequence);
        envelopes
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope> {
        let mut log = self.log.write().await;
        log.last_sequence += 1;

        let envelope = EventEnvelope {
            sequence: log.last_sequence,
            stream_id,
            event,
            stored_at: Utc::now(),
        };
        log.streams
            .entry(stream_id)
            .or_default()
            .push(envelope.clone());

        Ok(envelope)
    }

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log.streams.get(&stream_id).cloned().unwrap_or_default())
    }
}

/// Streams are keyed by partner so a partner's history reads in order.
#[async_trait]
impl EventSink for InMemoryEventStore {
    async fn deliver(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.append(event.partner_id, event.clone()).await?;
        Ok(())
    }
}
