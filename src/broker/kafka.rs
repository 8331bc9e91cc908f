//! `rdkafka`-backed [`QueueBroker`] (spec §4.G) — one producer for
//! `publish`, one consumer per worker for `poll`/`commit`, manual offset
//! commit throughout.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Message, TopicPartitionList};
use tokio::sync::Mutex;

use super::{BrokerError, DeliveryTag, GenerationMessage, InboundMessage, QueueBroker};

pub struct KafkaBroker {
    producer: FutureProducer,
    consumer: Option<Mutex<StreamConsumer>>,
}

impl KafkaBroker {
    /// A producer-only broker, suitable for the HTTP API's dispatch path.
    pub fn producer_only(bootstrap_servers: &str) -> Result<Self, BrokerError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(Self { producer, consumer: None })
    }

    /// A producer + consumer broker for one worker, subscribed to
    /// `topic` under `group` with auto-commit disabled (spec §4.G commit
    /// is explicit and per-message).
    pub fn with_consumer(bootstrap_servers: &str, topic: &str, group: &str) -> Result<Self, BrokerError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(Self { producer, consumer: Some(Mutex::new(consumer)) })
    }

    /// Partition count for `topic`, used by the scheduler to warn when
    /// `WORKER_COUNT > partitions` (spec §4.G).
    pub fn partition_count(&self, topic: &str) -> Result<usize, BrokerError> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(Some(topic), Duration::from_secs(10))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        metadata
            .topics()
            .first()
            .map(|t| t.partitions().len())
            .ok_or_else(|| BrokerError::Transport(format!("topic {topic} not found")))
    }
}

#[async_trait]
impl QueueBroker for KafkaBroker {
    async fn health_check(&self) -> Result<(), BrokerError> {
        self.producer
            .client()
            .fetch_metadata(None, Duration::from_secs(5))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, topic: &str, key: &str, message: &GenerationMessage) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(message).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let record = FutureRecord::to(topic).key(key).payload(&payload);
        self.producer
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| BrokerError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn poll(&self, _topic: &str, _group: &str) -> Result<Option<InboundMessage>, BrokerError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| BrokerError::Transport("broker has no consumer configured".to_string()))?
            .lock()
            .await;

        let borrowed = match consumer.recv().await {
            Ok(message) => message,
            Err(e) => return Err(BrokerError::Transport(e.to_string())),
        };

        let payload = borrowed
            .payload()
            .ok_or_else(|| BrokerError::Serialization("empty message payload".to_string()))?;
        let message: GenerationMessage =
            serde_json::from_slice(payload).map_err(|e| BrokerError::Serialization(e.to_string()))?;

        Ok(Some(InboundMessage {
            message,
            delivery_tag: DeliveryTag {
                topic: borrowed.topic().to_string(),
                partition: borrowed.partition(),
                offset: borrowed.offset(),
            },
        }))
    }

    async fn commit(&self, tag: &DeliveryTag) -> Result<(), BrokerError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| BrokerError::Transport("broker has no consumer configured".to_string()))?
            .lock()
            .await;

        let mut partitions = TopicPartitionList::new();
        partitions
            .add_partition_offset(&tag.topic, tag.partition, rdkafka::Offset::Offset(tag.offset + 1))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        consumer
            .commit(&partitions, rdkafka::consumer::CommitMode::Sync)
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BrokerError> {
        if let Some(consumer) = &self.consumer {
            consumer.lock().await.unsubscribe();
        }
        Ok(())
    }
}
