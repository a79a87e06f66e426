use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use voyara_core::{DomainEvent, EventSink};

pub const EVENT_CHANNEL_PREFIX: &str = "settlement";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

pub fn event_channel(event: &DomainEvent) -> String {
    format!("{EVENT_CHANNEL_PREFIX}.{}", event.kind.topic())
}

#[async_trait]
impl EventSink for RedisBus {
    async fn deliver(&self, event: &DomainEvent) -> Result<()> {
        self.publish_json(&event_channel(event), event).await
    }
}
