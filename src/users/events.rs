use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::repo_types::User;
use crate::config::EventsConfig;

/// Payload announced after a user has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreatedEvent {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserCreatedEvent {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            created_at: u.created_at,
        }
    }
}

/// Announces user lifecycle events to downstream consumers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_user_created(&self, event: &UserCreatedEvent) -> anyhow::Result<()>;
}

/// Keyed message transport (a broker producer).
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn produce(&self, topic: &str, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
}

/// Publishes events to a fixed topic, keyed by user id.
#[derive(Clone)]
pub struct BrokerEventPublisher {
    producer: Arc<dyn MessageProducer>,
    topic: String,
}

impl BrokerEventPublisher {
    pub fn new(producer: Arc<dyn MessageProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for BrokerEventPublisher {
    async fn publish_user_created(&self, event: &UserCreatedEvent) -> anyhow::Result<()> {
        let value = serde_json::to_value(event).context("serialize user created event")?;
        self.producer
            .produce(&self.topic, &event.id.to_string(), value)
            .await
            .with_context(|| format!("produce to {}", self.topic))?;
        info!(user_id = %event.id, topic = %self.topic, "user created event published");
        Ok(())
    }
}

/// Producer speaking the Kafka REST proxy v2 JSON protocol.
#[derive(Clone)]
pub struct RestProxyProducer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    key: &'a str,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

impl RestProxyProducer {
    pub fn new(cfg: &EventsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: cfg.rest_url.trim_end_matches('/').to_string(),
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

#[async_trait]
impl MessageProducer for RestProxyProducer {
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        value: serde_json::Value,
    ) -> anyhow::Result<()> {
        let body = ProduceRequest {
            records: [ProduceRecord { key, value }],
        };
        let res = self
            .client
            .post(self.topic_url(topic))
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.kafka.json.v2+json")
            .json(&body)
            .send()
            .await
            .context("rest proxy request")?;
        let status = res.status();
        anyhow::ensure!(status.is_success(), "rest proxy answered {status}");
        debug!(%topic, %key, "record accepted by rest proxy");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingProducer {
        pub(crate) sent: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    #[async_trait]
    impl MessageProducer for RecordingProducer {
        async fn produce(
        &self,
        topic: &str,
        key: &str,
        value: serde_json::Value,
    ) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((topic.into(), key.into(), value));
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub(crate) events: Mutex<Vec<UserCreatedEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish_user_created(&self, event: &UserCreatedEvent) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    pub(crate) struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish_user_created(&self, _event: &UserCreatedEvent) -> anyhow::Result<()> {
            anyhow::bail!("broker unavailable")
        }
    }
}
