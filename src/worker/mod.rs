//! Worker pool (spec §4.E) — fixed number of concurrent consumers
//! polling the broker, invoking the packager, and driving the
//! GenerationRequest state machine forward one message at a time.

mod params;

pub use params::choose_sentence_params;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::broker::{DeliveryTag, GenerationMessage, QueueBroker, GENERATION_REQUESTS_TOPIC, WORKER_CONSUMER_GROUP};
use crate::cache::{ConjugationCache, VerbCache};
use crate::packager::{PackagingRequest, ProblemPackager};
use crate::storage::{StorageError, StorageGateway};
use crate::tracker::RequestTracker;

/// Per-worker in-process redelivery guard (spec §B "idempotent worker
/// dedup"); bounded so a long-lived worker never grows this set without
/// limit.
const DEDUP_CACHE_CAPACITY: usize = 4096;

fn dedup_key(tag: &DeliveryTag) -> (String, i32, i64) {
    (tag.topic.clone(), tag.partition, tag.offset)
}

/// Shared dependencies every worker task needs; cheap to clone (all
/// fields are `Arc`s).
#[derive(Clone)]
pub struct WorkerDeps {
    pub broker: Arc<dyn QueueBroker>,
    pub storage: Arc<dyn StorageGateway>,
    pub tracker: Arc<RequestTracker>,
    pub packager: Arc<ProblemPackager>,
    pub verb_cache: Arc<VerbCache>,
    pub conjugation_cache: Arc<ConjugationCache>,
    pub model: String,
    pub message_deadline: Duration,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `worker_count` independent polling tasks. 0 disables the
    /// pool entirely (spec §4.E configuration note).
    pub fn spawn(worker_count: usize, deps: WorkerDeps) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let deps = deps.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let dedup: Mutex<LruCache<(String, i32, i64), ()>> =
                    Mutex::new(LruCache::new(NonZeroUsize::new(DEDUP_CACHE_CAPACITY).expect("nonzero capacity")));
                tracing::info!(worker = index, "worker started");
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        outcome = deps.broker.poll(GENERATION_REQUESTS_TOPIC, WORKER_CONSUMER_GROUP) => {
                            match outcome {
                                Ok(Some(inbound)) => {
                                    let key = dedup_key(&inbound.delivery_tag);
                                    if dedup.lock().await.contains(&key) {
                                        tracing::debug!(worker = index, "duplicate delivery, skipping reprocessing");
                                        continue;
                                    }
                                    let deadline = deps.message_deadline;
                                    let result = tokio::time::timeout(
                                        deadline,
                                        process_message(&deps, &inbound.message),
                                    )
                                    .await;
                                    match result {
                                        Ok(Ok(())) => {
                                            dedup.lock().await.put(key, ());
                                            if let Err(error) = deps.broker.commit(&inbound.delivery_tag).await {
                                                tracing::error!(worker = index, %error, "failed to commit offset");
                                            }
                                        }
                                        Ok(Err(error)) => {
                                            tracing::error!(worker = index, %error, "message processing failed, offset not committed");
                                        }
                                        Err(_) => {
                                            tracing::warn!(worker = index, "message processing exceeded deadline, abandoning without commit");
                                        }
                                    }
                                }
                                Ok(None) => {
                                    tokio::time::sleep(Duration::from_millis(200)).await;
                                }
                                Err(error) => {
                                    tracing::error!(worker = index, %error, "broker poll failed");
                                    tokio::time::sleep(Duration::from_secs(1)).await;
                                }
                            }
                        }
                    }
                }
                tracing::info!(worker = index, "worker stopped");
            }));
        }
        Self { handles, shutdown_tx }
    }

    /// Signals every worker to stop polling; in-flight messages run to
    /// their deadline before the consumer closes (spec §4.E
    /// cancellation).
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn process_message(deps: &WorkerDeps, message: &GenerationMessage) -> Result<(), crate::AppError> {
    let request = match deps.tracker.get(message.generation_request_id).await {
        Ok(request) => request,
        Err(StorageError::NotFound { .. }) => {
            // A mid-loop publish failure in `generate_problems` can roll
            // back the request row after some messages already reached the
            // broker (spec §8 boundary behaviour); treat the orphan as a
            // terminal no-op rather than erroring forever and starving a
            // worker slot on endless redelivery.
            tracing::warn!(
                request_id = %message.generation_request_id,
                "generation request not found, dropping orphaned message"
            );
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };
    if request.status.is_terminal() {
        // A redelivery that arrives after the request already reached a
        // terminal status (e.g. a producer retry, or a redelivery racing
        // the commit of an earlier successful attempt) is a no-op: acting
        // on it again would over-count generated/failed beyond
        // requested_count (spec §8 invariant 3, invariant 7).
        tracing::debug!(request_id = %request.id, "skipping message for already-terminal generation request");
        return Ok(());
    }

    deps.tracker.mark_processing(message.generation_request_id).await?;

    // Route the selected verb through the cache (spec §1/§4.A "verb cache
    // used on the hot generation path"): a small pool means the same verb
    // is picked repeatedly, so this warms into real hits over time rather
    // than a cold miss on every single generation.
    let picked = deps.storage.random_verb(false).await?;
    let verb = deps.verb_cache.lookup(picked.id).await?;

    deps.storage.touch_verb_last_used(verb.id).await?;
    deps.verb_cache.refresh(verb.id).await?;

    let params = choose_sentence_params(&verb);

    let conjugation = deps
        .conjugation_cache
        .lookup(&verb.infinitive, verb.auxiliary, verb.reflexive, params.tense)
        .await?;
    let reference_form = conjugation.and_then(|c| c.form_for_pronoun(&params.pronoun).map(str::to_string));

    let target_language_code = verb.language_code.clone();

    let packaging_request = PackagingRequest {
        verb,
        params,
        model: deps.model.clone(),
        target_language_code,
        topic_tags: Default::default(),
        generation_request_id: Some(message.generation_request_id),
        reference_form,
    };

    match deps.packager.package(packaging_request).await {
        Ok(problem) => {
            deps.storage.create_problem(problem).await?;
            deps.tracker.increment_generated(message.generation_request_id).await?;
        }
        Err(error) => {
            tracing::warn!(request_id = %request.id, %error, "sentence generation failed, counting as a failed problem");
            deps.tracker.increment_failed(message.generation_request_id).await?;
        }
    }

    deps.tracker.finalize_if_done(message.generation_request_id).await?;
    Ok(())
}
