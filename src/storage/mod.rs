//! Storage gateway (spec §4.I) — typed per-entity operations backed by
//! Postgres, plus an in-memory double for tests that never touches a
//! real database.
//!
//! Grounded on the `PgStorage` / `StorageError` / `row_to_*` conversion
//! idiom used throughout the corpus's Postgres-backed storage crates.

pub mod fake;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ApiKey, Conjugation, GenerationRequest, Problem, Sentence, Verb,
};

pub use fake::FakeStorage;
pub use postgres::PostgresStorage;

/// Distinct from `AppError` so the gateway stays independent of the HTTP
/// layer; `AppError::Repository` wraps this one kind at the boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Surfaces a unique-constraint violation distinctly from other
    /// failures (spec §4.I point 2) so callers can react to "already
    /// exists" without parsing driver error text.
    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: &'static str, detail: String },

    #[error("invalid {entity}: {detail}")]
    Validation { entity: &'static str, detail: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound { entity, id: id.to_string() }
    }

    pub fn validation(entity: &'static str, detail: impl Into<String>) -> Self {
        StorageError::Validation { entity, detail: detail.into() }
    }
}

/// Predicate accepted by [`StorageGateway::select_random_problem`] (spec
/// §4.H). All fields are conjunctive; `None` means "unconstrained".
#[derive(Debug, Clone, Default)]
pub struct ProblemFilter {
    pub problem_type: Option<crate::domain::ProblemType>,
    pub grammatical_focus: Option<Vec<String>>,
    pub tenses_used: Option<Vec<String>>,
    pub topic_tags: Option<Vec<String>>,
    pub target_language_code: Option<String>,
}

/// Filter accepted when listing generation requests for the admin surface.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequestFilter {
    pub status: Option<crate::domain::RequestStatus>,
    pub entity_type: Option<crate::domain::EntityType>,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestCounts {
    pub generated_count: u32,
    pub failed_count: u32,
}

/// The single seam the rest of the crate depends on for persistence.
/// Implemented by [`PostgresStorage`] in production and [`FakeStorage`]
/// in tests (spec §4.I).
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Cheapest possible round trip to the backend, used by the liveness
    /// endpoint (spec §6 `GET /health`).
    async fn health_check(&self) -> Result<(), StorageError>;

    // -- Verb -----------------------------------------------------------
    async fn create_verb(&self, verb: Verb) -> Result<Verb, StorageError>;
    async fn get_verb(&self, id: Uuid) -> Result<Verb, StorageError>;
    async fn find_verb_by_infinitive(&self, infinitive: &str) -> Result<Option<Verb>, StorageError>;
    async fn random_verb(&self, include_test: bool) -> Result<Verb, StorageError>;
    async fn update_verb(&self, verb: Verb) -> Result<Verb, StorageError>;
    async fn delete_verb(&self, id: Uuid) -> Result<(), StorageError>;
    async fn touch_verb_last_used(&self, id: Uuid) -> Result<(), StorageError>;
    /// Deletes every verb tagged `is_test` (and, via cascade, their
    /// sentences) — the `database clean` admin command.
    async fn delete_test_verbs(&self) -> Result<u64, StorageError>;
    /// Full table scan backing `VerbCache::reload_all` (spec §4.A
    /// "drop and re-populate"); not on any request-serving path.
    async fn list_verbs(&self) -> Result<Vec<Verb>, StorageError>;

    // -- Conjugation ------------------------------------------------------
    async fn create_conjugation(&self, conjugation: Conjugation) -> Result<Conjugation, StorageError>;
    async fn find_conjugation(
        &self,
        infinitive: &str,
        auxiliary: crate::domain::Auxiliary,
        reflexive: bool,
        tense: crate::domain::Tense,
    ) -> Result<Option<Conjugation>, StorageError>;
    async fn list_conjugations_for_verb(&self, infinitive: &str) -> Result<Vec<Conjugation>, StorageError>;
    /// Full table scan backing `ConjugationCache::reload_all`.
    async fn list_conjugations(&self) -> Result<Vec<Conjugation>, StorageError>;

    // -- Sentence ---------------------------------------------------------
    async fn create_sentence(&self, sentence: Sentence) -> Result<Sentence, StorageError>;
    async fn get_sentence(&self, id: Uuid) -> Result<Sentence, StorageError>;

    // -- Problem ----------------------------------------------------------
    async fn create_problem(&self, problem: Problem) -> Result<Problem, StorageError>;
    async fn get_problem(&self, id: Uuid) -> Result<Problem, StorageError>;
    /// Problems linked to a generation request, for the admin "request +
    /// embedded entities" view (spec §6 `GET /generation-requests/{id}`).
    async fn list_problems_for_request(&self, generation_request_id: Uuid) -> Result<Vec<Problem>, StorageError>;
    async fn select_random_problem(
        &self,
        filter: &ProblemFilter,
        virtual_staleness_seconds: i64,
    ) -> Result<Option<Problem>, StorageError>;
    /// Fire-and-forget stamp (spec §4.H) — callers do not await commit.
    async fn stamp_last_served(&self, id: Uuid) -> Result<(), StorageError>;
    async fn purge_problems_older_than(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
        topic_tag: Option<&str>,
    ) -> Result<u64, StorageError>;
    async fn count_problems(&self, filter: &ProblemFilter) -> Result<u64, StorageError>;

    // -- GenerationRequest --------------------------------------------------
    async fn create_generation_request(&self, request: GenerationRequest) -> Result<GenerationRequest, StorageError>;
    async fn get_generation_request(&self, id: Uuid) -> Result<GenerationRequest, StorageError>;
    async fn list_generation_requests(&self, filter: &GenerationRequestFilter) -> Result<Vec<GenerationRequest>, StorageError>;
    async fn mark_processing(&self, id: Uuid) -> Result<(), StorageError>;
    /// Atomic read-modify-write (spec §4.I point 1); returns the counts
    /// after increment so the tracker can decide terminality without a
    /// second round trip.
    async fn increment_generated(&self, id: Uuid) -> Result<RequestCounts, StorageError>;
    async fn increment_failed(&self, id: Uuid) -> Result<RequestCounts, StorageError>;
    async fn finalize_generation_request(
        &self,
        id: Uuid,
        status: crate::domain::RequestStatus,
        error_message: Option<String>,
    ) -> Result<GenerationRequest, StorageError>;
    async fn expire_stale_requests(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StorageError>;
    /// Rolls back a just-created request whose publish never went through
    /// (spec §8 boundary behaviour: "broker down at publish time → no
    /// request record remains") and backs the `generation-request clean`
    /// admin command.
    async fn delete_generation_request(&self, id: Uuid) -> Result<(), StorageError>;

    // -- ApiKey -------------------------------------------------------------
    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey, StorageError>;
    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StorageError>;
    async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StorageError>;
    async fn record_api_key_usage(&self, id: Uuid) -> Result<(), StorageError>;
    /// Full table scan backing `KeyCache::reload_all`.
    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StorageError>;
}
