//! Selector fairness (spec §8 invariant 6, scenario S2): problems that
//! have gone longest without being served should be selected
//! disproportionately more often than ones served a moment ago.

mod common;

use std::sync::Arc;
use std::collections::HashMap;

use chrono::{Duration, Utc};
use uuid::Uuid;

use quizforge::domain::{GenerationTrace, Problem, ProblemMetadata, ProblemType, Statement};
use quizforge::selector::ProblemSelector;
use quizforge::storage::{FakeStorage, ProblemFilter, StorageGateway};

fn blank_problem(last_served_at: Option<chrono::DateTime<Utc>>) -> Problem {
    let now = Utc::now();
    let statement = Statement::Grammar {
        content: "Il parle.".into(),
        is_correct: true,
        translation: Some("He speaks.".into()),
        explanation: None,
        extra: HashMap::new(),
    };
    Problem {
        id: Uuid::new_v4(),
        problem_type: ProblemType::Grammar,
        title: "parler — Present".into(),
        instructions: "Select the grammatically correct sentence.".into(),
        statements: vec![statement.clone(), statement.clone(), statement.clone(), statement],
        correct_answer_index: 0,
        topic_tags: Default::default(),
        source_statement_ids: Vec::new(),
        metadata: ProblemMetadata {
            grammatical_focus: vec![],
            tenses_used: vec!["Present".into()],
            verb_infinitives: vec!["parler".into()],
            includes_cod: false,
            includes_coi: false,
            includes_negation: false,
            prompt_version: "v1".into(),
        },
        target_language_code: "fra".into(),
        created_at: now,
        updated_at: now,
        last_served_at,
        generation_trace: GenerationTrace::from_sentences(vec![]),
        generation_request_id: None,
    }
}

#[tokio::test]
async fn stale_problem_is_selected_far_more_often_than_a_freshly_served_one() {
    let storage = Arc::new(FakeStorage::new());

    let stale = blank_problem(Some(Utc::now() - Duration::days(30)));
    let fresh = blank_problem(Some(Utc::now()));
    storage.create_problem(stale.clone()).await.unwrap();
    storage.create_problem(fresh.clone()).await.unwrap();

    // A short virtual-staleness window keeps "fresh" genuinely unattractive
    // relative to a problem untouched for a month.
    let selector = ProblemSelector::new(storage.clone(), 60);

    let mut stale_hits = 0;
    let mut fresh_hits = 0;
    for _ in 0..200 {
        let chosen = selector.select(ProblemFilter::default()).await.unwrap().unwrap();
        if chosen.id == stale.id {
            stale_hits += 1;
        } else if chosen.id == fresh.id {
            fresh_hits += 1;
        }
    }

    assert_eq!(stale_hits + fresh_hits, 200, "selector must only ever return one of the two seeded problems");
    assert!(
        stale_hits > fresh_hits * 3,
        "expected the month-stale problem to dominate selection, got stale={stale_hits} fresh={fresh_hits}"
    );
}

#[tokio::test]
async fn never_served_problems_are_eligible_immediately() {
    let storage = Arc::new(FakeStorage::new());
    let never_served = blank_problem(None);
    storage.create_problem(never_served.clone()).await.unwrap();

    let selector = ProblemSelector::new(storage, 1800);
    let chosen = selector.select(ProblemFilter::default()).await.unwrap();
    assert_eq!(chosen.unwrap().id, never_served.id);
}
