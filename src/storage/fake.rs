//! In-memory [`StorageGateway`] double used by integration tests so they
//! never need a live Postgres instance (spec §4.I is a seam precisely so
//! this substitution is possible).

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ApiKey, Auxiliary, Conjugation, GenerationRequest, Problem, RequestStatus, Sentence, Tense,
    Verb,
};

use super::{
    GenerationRequestFilter, ProblemFilter, RequestCounts, StorageError, StorageGateway,
};

#[derive(Default)]
struct Inner {
    verbs: HashMap<Uuid, Verb>,
    conjugations: HashMap<(String, Auxiliary, bool, Tense), Conjugation>,
    sentences: HashMap<Uuid, Sentence>,
    problems: HashMap<Uuid, Problem>,
    generation_requests: HashMap<Uuid, GenerationRequest>,
    api_keys: HashMap<Uuid, ApiKey>,
}

/// Not a production backend: unconstrained growth, no persistence across
/// process restarts. Exists only so unit and integration tests can drive
/// the rest of the crate against a real `StorageGateway` impl.
pub struct FakeStorage {
    inner: Mutex<Inner>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(problem: &Problem, filter: &ProblemFilter) -> bool {
    if let Some(pt) = filter.problem_type {
        if problem.problem_type != pt {
            return false;
        }
    }
    if let Some(lang) = &filter.target_language_code {
        if &problem.target_language_code != lang {
            return false;
        }
    }
    if let Some(tags) = &filter.topic_tags {
        if !tags.iter().any(|t| problem.topic_tags.contains(t)) {
            return false;
        }
    }
    if let Some(focus) = &filter.grammatical_focus {
        if !focus.iter().any(|f| problem.metadata.grammatical_focus.contains(f)) {
            return false;
        }
    }
    if let Some(tenses) = &filter.tenses_used {
        if !tenses.iter().any(|t| problem.metadata.tenses_used.contains(t)) {
            return false;
        }
    }
    true
}

#[async_trait]
impl StorageGateway for FakeStorage {
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn create_verb(&self, verb: Verb) -> Result<Verb, StorageError> {
        verb.validate().map_err(|d| StorageError::validation("verb", d))?;
        let mut inner = self.inner.lock().unwrap();
        if inner.verbs.values().any(|v| v.uniqueness_key() == verb.uniqueness_key()) {
            return Err(StorageError::AlreadyExists {
                entity: "verb",
                detail: verb.infinitive.clone(),
            });
        }
        inner.verbs.insert(verb.id, verb.clone());
        Ok(verb)
    }

    async fn get_verb(&self, id: Uuid) -> Result<Verb, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .verbs
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("verb", id))
    }

    async fn find_verb_by_infinitive(&self, infinitive: &str) -> Result<Option<Verb>, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .verbs
            .values()
            .find(|v| v.infinitive == infinitive)
            .cloned())
    }

    async fn random_verb(&self, include_test: bool) -> Result<Verb, StorageError> {
        let inner = self.inner.lock().unwrap();
        let candidates: Vec<&Verb> = inner
            .verbs
            .values()
            .filter(|v| include_test || !v.is_test)
            .collect();
        if candidates.is_empty() {
            return Err(StorageError::not_found("verb", "<random>"));
        }
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        Ok(candidates[idx].clone())
    }

    async fn update_verb(&self, verb: Verb) -> Result<Verb, StorageError> {
        verb.validate().map_err(|d| StorageError::validation("verb", d))?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.verbs.contains_key(&verb.id) {
            return Err(StorageError::not_found("verb", verb.id));
        }
        inner.verbs.insert(verb.id, verb.clone());
        Ok(verb)
    }

    async fn delete_verb(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.verbs.remove(&id).ok_or_else(|| StorageError::not_found("verb", id))?;
        inner.sentences.retain(|_, sentence| sentence.verb_id != id);
        Ok(())
    }

    async fn touch_verb_last_used(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let verb = inner.verbs.get_mut(&id).ok_or_else(|| StorageError::not_found("verb", id))?;
        verb.last_used_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn delete_test_verbs(&self) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let removed_ids: std::collections::HashSet<Uuid> =
            inner.verbs.values().filter(|v| v.is_test).map(|v| v.id).collect();
        inner.verbs.retain(|_, verb| !verb.is_test);
        inner.sentences.retain(|_, sentence| !removed_ids.contains(&sentence.verb_id));
        Ok(removed_ids.len() as u64)
    }

    async fn list_verbs(&self) -> Result<Vec<Verb>, StorageError> {
        Ok(self.inner.lock().unwrap().verbs.values().cloned().collect())
    }

    async fn create_conjugation(&self, conjugation: Conjugation) -> Result<Conjugation, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let key = conjugation.uniqueness_key();
        if inner.conjugations.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                entity: "conjugation",
                detail: conjugation.infinitive.clone(),
            });
        }
        inner.conjugations.insert(key, conjugation.clone());
        Ok(conjugation)
    }

    async fn find_conjugation(
        &self,
        infinitive: &str,
        auxiliary: Auxiliary,
        reflexive: bool,
        tense: Tense,
    ) -> Result<Option<Conjugation>, StorageError> {
        let key = (infinitive.to_string(), auxiliary, reflexive, tense);
        Ok(self.inner.lock().unwrap().conjugations.get(&key).cloned())
    }

    async fn list_conjugations_for_verb(&self, infinitive: &str) -> Result<Vec<Conjugation>, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .conjugations
            .values()
            .filter(|c| c.infinitive == infinitive)
            .cloned()
            .collect())
    }

    async fn list_conjugations(&self) -> Result<Vec<Conjugation>, StorageError> {
        Ok(self.inner.lock().unwrap().conjugations.values().cloned().collect())
    }

    async fn create_sentence(&self, sentence: Sentence) -> Result<Sentence, StorageError> {
        sentence.validate().map_err(|d| StorageError::validation("sentence", d))?;
        self.inner.lock().unwrap().sentences.insert(sentence.id, sentence.clone());
        Ok(sentence)
    }

    async fn get_sentence(&self, id: Uuid) -> Result<Sentence, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .sentences
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("sentence", id))
    }

    async fn create_problem(&self, problem: Problem) -> Result<Problem, StorageError> {
        problem.validate().map_err(|d| StorageError::validation("problem", d))?;
        self.inner.lock().unwrap().problems.insert(problem.id, problem.clone());
        Ok(problem)
    }

    async fn get_problem(&self, id: Uuid) -> Result<Problem, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .problems
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("problem", id))
    }

    async fn list_problems_for_request(&self, generation_request_id: Uuid) -> Result<Vec<Problem>, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .problems
            .values()
            .filter(|p| p.generation_request_id == Some(generation_request_id))
            .cloned()
            .collect())
    }

    async fn select_random_problem(
        &self,
        filter: &ProblemFilter,
        virtual_staleness_seconds: i64,
    ) -> Result<Option<Problem>, StorageError> {
        let now = chrono::Utc::now();
        let mut rng = rand::thread_rng();
        let best = self
            .inner
            .lock()
            .unwrap()
            .problems
            .values()
            .filter(|p| matches_filter(p, filter))
            .map(|p| {
                let age_seconds = match p.last_served_at {
                    Some(ts) => (now - ts).num_seconds().max(0),
                    None => virtual_staleness_seconds,
                };
                let jitter: f64 = rng.gen_range(0.5..1.5);
                let score = (age_seconds.max(virtual_staleness_seconds) as f64) * jitter;
                (score, p.clone())
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, p)| p);
        Ok(best)
    }

    async fn stamp_last_served(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(problem) = inner.problems.get_mut(&id) {
            problem.last_served_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn purge_problems_older_than(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
        topic_tag: Option<&str>,
    ) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let to_remove: Vec<Uuid> = inner
            .problems
            .values()
            .filter(|p| {
                p.created_at < older_than
                    && topic_tag.map(|tag| p.topic_tags.contains(tag)).unwrap_or(true)
            })
            .map(|p| p.id)
            .collect();
        let count = to_remove.len() as u64;
        for id in to_remove {
            inner.problems.remove(&id);
        }
        Ok(count)
    }

    async fn count_problems(&self, filter: &ProblemFilter) -> Result<u64, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .problems
            .values()
            .filter(|p| matches_filter(p, filter))
            .count() as u64)
    }

    async fn create_generation_request(&self, request: GenerationRequest) -> Result<GenerationRequest, StorageError> {
        self.inner.lock().unwrap().generation_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_generation_request(&self, id: Uuid) -> Result<GenerationRequest, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .generation_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("generation_request", id))
    }

    async fn list_generation_requests(&self, filter: &GenerationRequestFilter) -> Result<Vec<GenerationRequest>, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .generation_requests
            .values()
            .filter(|r| filter.status.map(|s| s == r.status).unwrap_or(true))
            .filter(|r| filter.entity_type.map(|t| t == r.entity_type).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let request = inner
            .generation_requests
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        if request.status == RequestStatus::Pending {
            request.status = RequestStatus::Processing;
            request.started_at.get_or_insert_with(chrono::Utc::now);
        }
        Ok(())
    }

    async fn increment_generated(&self, id: Uuid) -> Result<RequestCounts, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let request = inner
            .generation_requests
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        request.generated_count += 1;
        Ok(RequestCounts { generated_count: request.generated_count, failed_count: request.failed_count })
    }

    async fn increment_failed(&self, id: Uuid) -> Result<RequestCounts, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let request = inner
            .generation_requests
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        request.failed_count += 1;
        Ok(RequestCounts { generated_count: request.generated_count, failed_count: request.failed_count })
    }

    async fn finalize_generation_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<GenerationRequest, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let request = inner
            .generation_requests
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        request.status = status;
        request.completed_at = Some(chrono::Utc::now());
        request.error_message = error_message;
        Ok(request.clone())
    }

    async fn expire_stale_requests(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for request in inner.generation_requests.values_mut() {
            if !request.status.is_terminal() && request.requested_at < older_than {
                request.status = RequestStatus::Expired;
                request.completed_at = Some(chrono::Utc::now());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_generation_request(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.generation_requests.remove(&id);
        Ok(())
    }

    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.api_keys.values().any(|k| k.prefix == key.prefix) {
            return Err(StorageError::AlreadyExists { entity: "api_key", detail: key.prefix.clone() });
        }
        inner.api_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .api_keys
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("api_key", id))
    }

    async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StorageError> {
        Ok(self.inner.lock().unwrap().api_keys.values().find(|k| k.prefix == prefix).cloned())
    }

    async fn record_api_key_usage(&self, id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let key = inner.api_keys.get_mut(&id).ok_or_else(|| StorageError::not_found("api_key", id))?;
        key.usage_count += 1;
        key.last_used_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StorageError> {
        Ok(self.inner.lock().unwrap().api_keys.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Auxiliary, Verb};

    fn sample_verb() -> Verb {
        let now = chrono::Utc::now();
        Verb {
            id: Uuid::new_v4(),
            infinitive: "parler".into(),
            auxiliary: Auxiliary::Avoir,
            reflexive: false,
            language_code: "fra".into(),
            translation: "to speak".into(),
            past_participle: "parlé".into(),
            present_participle: "parlant".into(),
            classification: None,
            irregular: false,
            can_have_direct_object: true,
            can_have_indirect_object: true,
            is_test: false,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_verb_uniqueness_key() {
        let storage = FakeStorage::new();
        let verb = sample_verb();
        storage.create_verb(verb.clone()).await.unwrap();
        let mut dup = sample_verb();
        dup.id = Uuid::new_v4();
        let err = storage.create_verb(dup).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn increment_generated_is_read_modify_write_consistent() {
        let storage = FakeStorage::new();
        let request = crate::domain::GenerationRequest::new(
            crate::domain::EntityType::Problem,
            3,
            serde_json::json!({}),
            serde_json::json!({}),
        );
        let id = request.id;
        storage.create_generation_request(request).await.unwrap();
        storage.increment_generated(id).await.unwrap();
        let counts = storage.increment_generated(id).await.unwrap();
        assert_eq!(counts.generated_count, 2);
    }
}
