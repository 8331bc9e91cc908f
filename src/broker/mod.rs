//! Queue broker interface (spec §4.G) — the trait the worker pool and
//! scheduler depend on, a `rdkafka` implementation, and the declarative
//! topic-provisioning migration.

pub mod fake;
pub mod kafka;
pub mod topics;

pub use fake::FakeBroker;
pub use kafka::KafkaBroker;
pub use topics::{TopicConfig, TopicDefinitions};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GENERATION_REQUESTS_TOPIC: &str = "problem-generation-requests";
pub const WORKER_CONSUMER_GROUP: &str = "problem-generator-workers";

/// Wire body published to `problem-generation-requests` (spec §4.G) — the
/// message key is always the request id so every message for one request
/// lands on the same partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMessage {
    pub generation_request_id: Uuid,
    /// Always 1 per message; N-problem requests publish N messages
    /// (spec §4.E point 2).
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Value>,
}

/// An inbound message plus the handle the worker needs to commit its
/// offset once side-effects have landed (spec §4.E point 9).
pub struct InboundMessage {
    pub message: GenerationMessage,
    pub delivery_tag: DeliveryTag,
}

/// Opaque per-message handle; `commit` is explicit and per-message
/// (spec §4.G contract).
#[derive(Debug, Clone)]
pub struct DeliveryTag {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker transport error: {0}")]
    Transport(String),
    #[error("message serialization error: {0}")]
    Serialization(String),
}

/// The seam the worker pool and dispatch path depend on (spec §4.G
/// contract: publish/subscribe/commit/shutdown).
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Cheapest possible round trip to the broker, used by the liveness
    /// endpoint (spec §6 `GET /health`).
    async fn health_check(&self) -> Result<(), BrokerError>;

    async fn publish(&self, topic: &str, key: &str, message: &GenerationMessage) -> Result<(), BrokerError>;
    async fn poll(&self, topic: &str, group: &str) -> Result<Option<InboundMessage>, BrokerError>;
    async fn commit(&self, tag: &DeliveryTag) -> Result<(), BrokerError>;
    async fn shutdown(&self) -> Result<(), BrokerError>;
}
