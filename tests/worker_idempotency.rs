//! Worker idempotency (spec §8 invariant 7, scenario S4): redelivering
//! the same message must never produce a second problem or double-count
//! the generation request's counters.

mod common;

use std::sync::Arc;
use std::time::Duration;

use quizforge::broker::{FakeBroker, GenerationMessage, QueueBroker, GENERATION_REQUESTS_TOPIC};
use quizforge::cache::{ConjugationCache, VerbCache};
use quizforge::domain::EntityType;
use quizforge::llm::LlmGenerator;
use quizforge::packager::ProblemPackager;
use quizforge::storage::{FakeStorage, ProblemFilter, StorageGateway};
use quizforge::tracker::RequestTracker;
use quizforge::worker::{WorkerDeps, WorkerPool};

use common::{sample_verb, FakeLlm};

#[tokio::test]
async fn duplicate_delivery_of_the_same_offset_yields_exactly_one_problem() {
    let storage = Arc::new(FakeStorage::new());
    let broker: Arc<dyn QueueBroker> = Arc::new(FakeBroker::new());
    let tracker = Arc::new(RequestTracker::new(storage.clone()));
    let packager = Arc::new(ProblemPackager::new(Arc::new(FakeLlm) as Arc<dyn LlmGenerator>));

    storage.create_verb(sample_verb("parler")).await.unwrap();

    let request = tracker
        .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
        .await
        .unwrap();

    let message = GenerationMessage { generation_request_id: request.id, count: 1, constraints: None };
    broker.publish(GENERATION_REQUESTS_TOPIC, &request.id.to_string(), &message).await.unwrap();

    let deps = WorkerDeps {
        broker: broker.clone(),
        storage: storage.clone(),
        tracker: tracker.clone(),
        packager,
        verb_cache: Arc::new(VerbCache::new(storage.clone())),
        conjugation_cache: Arc::new(ConjugationCache::new(storage.clone())),
        model: "test-model".to_string(),
        message_deadline: Duration::from_secs(5),
    };

    let pool = WorkerPool::spawn(1, deps);

    // Give the single worker time to drain the one published message.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Re-publish the identical message body as a redelivery (a fresh
    // delivery tag, as a real redelivery after a consumer restart would
    // carry) and let the worker pick it up again; the request is already
    // terminal by now, so processing must be a no-op.
    broker.publish(GENERATION_REQUESTS_TOPIC, &request.id.to_string(), &message).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    pool.shutdown().await;

    let problems = storage.count_problems(&ProblemFilter::default()).await.unwrap();
    let final_request = tracker.get(request.id).await.unwrap();

    assert_eq!(problems, 1, "a redelivered message must not create a second problem");
    assert_eq!(final_request.generated_count, 1, "generated_count must not double-count a redelivery");
    assert!(final_request.status.is_done(), "single-message request should reach a terminal state");
}

#[tokio::test]
async fn redelivery_via_requeue_after_terminal_status_is_a_no_op() {
    // `FakeBroker::requeue` simulates a post-restart redelivery: a fresh
    // delivery tag carrying the same logical message. By the time it is
    // polled, the request has already reached a terminal status, so the
    // worker must skip it rather than minting a second problem.
    let storage = Arc::new(FakeStorage::new());
    let broker = Arc::new(FakeBroker::new());
    let tracker = Arc::new(RequestTracker::new(storage.clone()));
    let packager = Arc::new(ProblemPackager::new(Arc::new(FakeLlm) as Arc<dyn LlmGenerator>));

    storage.create_verb(sample_verb("finir")).await.unwrap();

    let request = tracker
        .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
        .await
        .unwrap();
    let message = GenerationMessage { generation_request_id: request.id, count: 1, constraints: None };

    broker.publish(GENERATION_REQUESTS_TOPIC, &request.id.to_string(), &message).await.unwrap();

    let deps = WorkerDeps {
        broker: broker.clone() as Arc<dyn QueueBroker>,
        storage: storage.clone(),
        tracker: tracker.clone(),
        packager,
        verb_cache: Arc::new(VerbCache::new(storage.clone())),
        conjugation_cache: Arc::new(ConjugationCache::new(storage.clone())),
        model: "test-model".to_string(),
        message_deadline: Duration::from_secs(5),
    };
    let pool = WorkerPool::spawn(1, deps);
    tokio::time::sleep(Duration::from_millis(300)).await;

    broker.requeue(GENERATION_REQUESTS_TOPIC, message);
    tokio::time::sleep(Duration::from_millis(300)).await;

    pool.shutdown().await;

    let problems = storage.count_problems(&ProblemFilter::default()).await.unwrap();
    assert_eq!(problems, 1, "a requeued redelivery must be a no-op once the request is already terminal");
}
