//! Thin publish abstraction over RabbitMQ, used by the outbox poller and
//! the saga orchestrator's command/event channels.

pub mod topics;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::errors::ServiceError;
use async_trait::async_trait;
use lapin::{options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a pre-serialized payload to `topic`. Declares the target
    /// queue on first use, matching the at-least-once default exchange
    /// routing this crate relies on end to end.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ServiceError>;
}

/// `MessageBus` backed by a single RabbitMQ channel shared across callers.
/// Every destination topic is declared lazily on first publish; repeat
/// declarations are a cheap no-op on the broker.
#[derive(Clone)]
pub struct RabbitMqBus {
    channel: Arc<Channel>,
    breaker: Arc<CircuitBreaker>,
}

impl RabbitMqBus {
    pub async fn connect(amqp_url: &str) -> Result<Self, ServiceError> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| ServiceError::DependencyUnavailable(format!("amqp connect: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ServiceError::DependencyUnavailable(format!("amqp channel: {e}")))?;
        Ok(Self {
            channel: Arc::new(channel),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        })
    }

    async fn declare(&self, topic: &str) -> Result<(), ServiceError> {
        self.channel
            .queue_declare(topic, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| ServiceError::DependencyUnavailable(format!("amqp declare: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RabbitMqBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ServiceError> {
        self.declare(topic).await?;
        let channel = self.channel.clone();
        let topic_owned = topic.to_string();
        let payload_owned = payload.to_vec();

        self.breaker
            .call(|| async move {
                channel
                    .basic_publish(
                        "",
                        &topic_owned,
                        BasicPublishOptions::default(),
                        &payload_owned,
                        BasicProperties::default().with_delivery_mode(2),
                    )
                    .await
                    .map_err(|e| ServiceError::DependencyUnavailable(format!("amqp publish: {e}")))?
                    .await
                    .map_err(|e| ServiceError::DependencyUnavailable(format!("amqp confirm: {e}")))
            })
            .await
            .map_err(|err| match err {
                CircuitBreakerError::Open => {
                    ServiceError::DependencyUnavailable("message bus circuit is open".to_string())
                }
                CircuitBreakerError::Inner(inner) => inner,
            })?;

        info!(topic, "published message");
        Ok(())
    }
}

/// In-memory bus used by tests, capturing every publish for assertions.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    published: Arc<tokio::sync::Mutex<Vec<(String, Vec<u8>)>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ServiceError> {
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bus_records_publishes() {
        let bus = InMemoryBus::new();
        bus.publish("booking-events", b"payload").await.unwrap();
        let published = bus.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "booking-events");
    }
}
