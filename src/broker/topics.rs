//! Declarative topic configuration (spec §4.G) — a YAML document of
//! `{name, partitions, replication_factor, config}` entries, applied on
//! boot by [`TopicDefinitions::apply`].

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::metadata::Metadata;
use serde::Deserialize;

use super::BrokerError;

#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicDefinitions {
    pub topics: Vec<TopicConfig>,
}

impl TopicDefinitions {
    pub fn load(path: &str) -> Result<Self, BrokerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Transport(format!("reading {path}: {e}")))?;
        serde_yaml::from_str(&raw).map_err(|e| BrokerError::Serialization(e.to_string()))
    }

    /// Creates missing topics and raises partition counts that fall short
    /// of a definition; never lowers a partition count (spec §4.G).
    pub async fn apply(&self, bootstrap_servers: &str) -> Result<(), BrokerError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let metadata: Metadata = admin
            .inner()
            .fetch_metadata(None, Duration::from_secs(10))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let existing: HashMap<String, usize> = metadata
            .topics()
            .iter()
            .map(|t| (t.name().to_string(), t.partitions().len()))
            .collect();

        let options = AdminOptions::new().operation_timeout(Some(Duration::from_secs(30)));

        let mut to_create = Vec::new();
        for topic in &self.topics {
            match existing.get(&topic.name) {
                None => to_create.push(topic),
                Some(&current_partitions) => {
                    if (current_partitions as i32) < topic.partitions {
                        let new_partitions = rdkafka::admin::NewPartitions::new(&topic.name, topic.partitions as usize);
                        admin
                            .create_partitions(&[new_partitions], &options)
                            .await
                            .map_err(|e| BrokerError::Transport(e.to_string()))?;
                        tracing::info!(topic = %topic.name, from = current_partitions, to = topic.partitions, "raised partition count");
                    }
                }
            }
        }

        if !to_create.is_empty() {
            let new_topics: Vec<NewTopic> = to_create
                .iter()
                .map(|t| {
                    let mut new_topic = NewTopic::new(
                        &t.name,
                        t.partitions,
                        TopicReplication::Fixed(t.replication_factor),
                    );
                    for (key, value) in &t.config {
                        new_topic = new_topic.set(key, value);
                    }
                    new_topic
                })
                .collect();
            admin
                .create_topics(&new_topics, &options)
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
            for topic in &to_create {
                tracing::info!(topic = %topic.name, partitions = topic.partitions, "created topic");
            }
        }

        Ok(())
    }
}
