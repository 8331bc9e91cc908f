//! Prompt builder mandatory-error contract (spec §4.B) and the
//! generation-request state machine (spec §4.F, §8 invariant 3), exercised
//! at the crate boundary rather than via the modules' own inline tests.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use quizforge::domain::{EntityType, Negation, ObjectCategory, RequestStatus, Tense};
use quizforge::prompt::{select_error_types, ErrorType, SentenceParams};
use quizforge::storage::FakeStorage;
use quizforge::tracker::RequestTracker;

use common::sample_verb;

fn params_with_objects(direct: ObjectCategory, indirect: ObjectCategory) -> SentenceParams {
    SentenceParams {
        pronoun: "elle".into(),
        tense: Tense::Present,
        negation: Negation::None,
        direct_object: direct,
        indirect_object: indirect,
        reflexive_pronoun: ObjectCategory::None,
    }
}

#[test]
fn cod_and_coi_are_both_mandatory_when_both_objects_are_present() {
    let verb = sample_verb("donner");
    let params = params_with_objects(ObjectCategory::Masc, ObjectCategory::Fem);
    for _ in 0..50 {
        let chosen = select_error_types(&verb, &params);
        assert!(chosen.contains(&ErrorType::CodPronounError), "COD must always appear: {chosen:?}");
        assert!(chosen.contains(&ErrorType::CoiPronounError), "COI must always appear: {chosen:?}");
    }
}

#[test]
fn mandatory_slots_never_exceed_the_three_available() {
    // Compound tense + COD + COI makes five error types eligible; the
    // mandatory pair still leaves exactly one slot for random sampling,
    // never four mandatory entries crammed into three slots.
    let mut verb = sample_verb("aller");
    verb.auxiliary = quizforge::domain::Auxiliary::Etre;
    let params = SentenceParams {
        pronoun: "elle".into(),
        tense: Tense::PasseCompose,
        negation: Negation::None,
        direct_object: ObjectCategory::Masc,
        indirect_object: ObjectCategory::Fem,
        reflexive_pronoun: ObjectCategory::None,
    };
    let chosen = select_error_types(&verb, &params);
    assert_eq!(chosen.len(), 3);
    assert!(chosen.contains(&ErrorType::CodPronounError));
    assert!(chosen.contains(&ErrorType::CoiPronounError));
}

#[tokio::test]
async fn request_tracker_drives_pending_through_completed() {
    let storage = Arc::new(FakeStorage::new());
    let tracker = RequestTracker::new(storage);

    let request = tracker
        .create(EntityType::Problem, 3, serde_json::json!({}), serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    tracker.mark_processing(request.id).await.unwrap();
    let processing = tracker.get(request.id).await.unwrap();
    assert_eq!(processing.status, RequestStatus::Processing);
    assert!(processing.started_at.is_some());

    // Marking processing again must not disturb an already-started request.
    let started_at = processing.started_at;
    tracker.mark_processing(request.id).await.unwrap();
    assert_eq!(tracker.get(request.id).await.unwrap().started_at, started_at);

    tracker.increment_generated(request.id).await.unwrap();
    tracker.increment_generated(request.id).await.unwrap();
    assert!(tracker.finalize_if_done(request.id).await.unwrap().is_none());

    tracker.increment_generated(request.id).await.unwrap();
    let finalized = tracker.finalize_if_done(request.id).await.unwrap().unwrap();
    assert_eq!(finalized.status, RequestStatus::Completed);
    assert!(finalized.completed_at.is_some());
}

#[tokio::test]
async fn expire_stale_only_touches_non_terminal_requests_past_the_horizon() {
    let storage = Arc::new(FakeStorage::new());
    let tracker = RequestTracker::new(storage);

    let stale_pending = tracker
        .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
        .await
        .unwrap();
    let completed = tracker
        .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
        .await
        .unwrap();
    tracker.increment_generated(completed.id).await.unwrap();
    tracker.finalize_if_done(completed.id).await.unwrap();

    let horizon = Utc::now() + Duration::seconds(1);
    let expired_count = tracker.expire_stale(horizon).await.unwrap();

    assert_eq!(expired_count, 1, "only the still-pending request should expire");
    assert_eq!(tracker.get(stale_pending.id).await.unwrap().status, RequestStatus::Expired);
    assert_eq!(tracker.get(completed.id).await.unwrap().status, RequestStatus::Completed);
}
