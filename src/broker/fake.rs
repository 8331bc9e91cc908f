//! In-memory [`QueueBroker`] double (spec §A.4) — a single `VecDeque` per
//! topic with monotonic offsets, so tests can exercise the worker pool's
//! poll/commit/dedup behavior without a real Kafka cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BrokerError, DeliveryTag, GenerationMessage, InboundMessage, QueueBroker};

struct Topic {
    queue: VecDeque<(i64, GenerationMessage)>,
    next_offset: i64,
}

impl Default for Topic {
    fn default() -> Self {
        Self { queue: VecDeque::new(), next_offset: 0 }
    }
}

pub struct FakeBroker {
    topics: Mutex<HashMap<String, Topic>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()) }
    }
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBroker for FakeBroker {
    async fn health_check(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, topic: &str, _key: &str, message: &GenerationMessage) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock().unwrap();
        let entry = topics.entry(topic.to_string()).or_default();
        let offset = entry.next_offset;
        entry.next_offset += 1;
        entry.queue.push_back((offset, message.clone()));
        Ok(())
    }

    async fn poll(&self, topic: &str, _group: &str) -> Result<Option<InboundMessage>, BrokerError> {
        let mut topics = self.topics.lock().unwrap();
        let Some(entry) = topics.get_mut(topic) else { return Ok(None) };
        let Some((offset, message)) = entry.queue.pop_front() else { return Ok(None) };
        Ok(Some(InboundMessage {
            message,
            delivery_tag: DeliveryTag { topic: topic.to_string(), partition: 0, offset },
        }))
    }

    /// No-op: the fake never redelivers once popped, so committing is
    /// only meaningful as a signal tests can assert was reached.
    async fn commit(&self, _tag: &DeliveryTag) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

impl FakeBroker {
    /// Re-queues a message at the front with a fresh delivery tag,
    /// simulating a redelivery after an uncommitted abandon (tests only).
    pub fn requeue(&self, topic: &str, message: GenerationMessage) {
        let mut topics = self.topics.lock().unwrap();
        let entry = topics.entry(topic.to_string()).or_default();
        let offset = entry.next_offset;
        entry.next_offset += 1;
        entry.queue.push_front((offset, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_then_poll_round_trips_a_message() {
        let broker = FakeBroker::new();
        let message = GenerationMessage { generation_request_id: Uuid::new_v4(), count: 1, constraints: None };
        broker.publish("t", "key", &message).await.unwrap();

        let inbound = broker.poll("t", "group").await.unwrap().unwrap();
        assert_eq!(inbound.message.generation_request_id, message.generation_request_id);
        assert!(broker.poll("t", "group").await.unwrap().is_none());
    }
}
