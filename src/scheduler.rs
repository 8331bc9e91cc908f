//! Process bootstrap and shutdown coordination (spec §4.G, §B "Graceful
//! shutdown") — wires storage, broker, caches, worker pool, sweeper, and
//! the HTTP API into one running service and tears them down in order on
//! `ctrl_c`.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{start_server, ApiState};
use crate::broker::{KafkaBroker, TopicDefinitions, GENERATION_REQUESTS_TOPIC, WORKER_CONSUMER_GROUP};
use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::packager::ProblemPackager;
use crate::storage::{PostgresStorage, StorageGateway};
use crate::sweeper::Sweeper;
use crate::tracker::RequestTracker;
use crate::worker::{WorkerDeps, WorkerPool};

/// Connects storage, provisions broker topics, and runs the HTTP API, the
/// worker pool, and the sweeper until `ctrl_c` (or another external
/// shutdown signal in tests) fires.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let storage = PostgresStorage::connect(&config.database_url).await?;
    storage.migrate().await?;
    let storage: Arc<dyn StorageGateway> = Arc::new(storage);

    let topics = TopicDefinitions::load(&config.broker_topics_path)?;
    topics.apply(&config.broker_bootstrap_servers).await?;

    let dispatch_broker: Arc<dyn crate::broker::QueueBroker> =
        Arc::new(KafkaBroker::producer_only(&config.broker_bootstrap_servers)?);

    let worker_broker_impl = KafkaBroker::with_consumer(
        &config.broker_bootstrap_servers,
        GENERATION_REQUESTS_TOPIC,
        WORKER_CONSUMER_GROUP,
    )?;
    match worker_broker_impl.partition_count(GENERATION_REQUESTS_TOPIC) {
        Ok(partitions) if config.worker_count > partitions => {
            tracing::warn!(
                worker_count = config.worker_count,
                partitions,
                "WORKER_COUNT exceeds partition count, some workers will sit idle"
            );
        }
        Ok(_) => {}
        Err(error) => tracing::warn!(%error, "failed to read partition count for worker/partition ratio check"),
    }
    let worker_broker: Arc<dyn crate::broker::QueueBroker> = Arc::new(worker_broker_impl);

    let llm = LlmClient::new(config.llm_api_base.clone(), config.llm_api_key.clone(), config.llm_max_retries);
    let packager = Arc::new(ProblemPackager::new(Arc::new(llm)));

    // The caches live on `ApiState` but are shared with the worker pool
    // (spec §5: "the HTTP handlers and workers share the process address
    // space and therefore the caches") — built here, before `ApiState` is
    // wrapped in its `Arc`, so both sides hold the same instances.
    let http_port = config.http_port;
    let worker_count = config.worker_count;
    let api_state = ApiState::new(config, storage.clone(), dispatch_broker);
    let verb_cache = api_state.verb_cache.clone();
    let conjugation_cache = api_state.conjugation_cache.clone();

    let worker_tracker = Arc::new(RequestTracker::new(storage.clone()));
    let worker_deps = WorkerDeps {
        broker: worker_broker,
        storage: storage.clone(),
        tracker: worker_tracker.clone(),
        packager,
        verb_cache,
        conjugation_cache,
        model: api_state.config.llm_model.clone(),
        message_deadline: api_state.config.generation_timeout(),
    };
    let worker_pool = WorkerPool::spawn(worker_count, worker_deps);
    let sweeper = Sweeper::spawn(worker_tracker, api_state.config.request_expiry());

    let server_handle = tokio::spawn(start_server(Arc::new(api_state), http_port));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping service");

    worker_pool.shutdown().await;
    sweeper.shutdown().await;
    server_handle.abort();
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    Ok(())
}
