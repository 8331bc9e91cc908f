//! Request tracker (spec §4.F) — owns the GenerationRequest lifecycle on
//! top of the storage gateway's atomic counter primitives.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{EntityType, GenerationRequest, RequestStatus};
use crate::storage::{GenerationRequestFilter, RequestCounts, StorageError, StorageGateway};

pub struct RequestTracker {
    storage: Arc<dyn StorageGateway>,
}

impl RequestTracker {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage }
    }

    pub async fn create(
        &self,
        entity_type: EntityType,
        count: u32,
        constraints: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<GenerationRequest, StorageError> {
        let request = GenerationRequest::new(entity_type, count, constraints, metadata);
        self.storage.create_generation_request(request).await
    }

    /// Idempotent: only advances a `pending` request (spec §4.F).
    pub async fn mark_processing(&self, request_id: Uuid) -> Result<(), StorageError> {
        self.storage.mark_processing(request_id).await
    }

    pub async fn increment_generated(&self, request_id: Uuid) -> Result<RequestCounts, StorageError> {
        self.storage.increment_generated(request_id).await
    }

    pub async fn increment_failed(&self, request_id: Uuid) -> Result<RequestCounts, StorageError> {
        self.storage.increment_failed(request_id).await
    }

    /// Writes the terminal status once `generated + failed == requested`
    /// (spec §4.F, §8 invariant 3); a no-op (returns `Ok(None)`) otherwise.
    pub async fn finalize_if_done(&self, request_id: Uuid) -> Result<Option<GenerationRequest>, StorageError> {
        let request = self.storage.get_generation_request(request_id).await?;
        if request.status.is_terminal() {
            return Ok(Some(request));
        }
        if request.generated_count + request.failed_count < request.requested_count {
            return Ok(None);
        }
        let status = RequestStatus::from_counts(request.generated_count, request.failed_count);
        let finalized = self
            .storage
            .finalize_generation_request(request_id, status, None)
            .await?;
        Ok(Some(finalized))
    }

    /// Batch-expires `pending`/`processing` requests untouched longer
    /// than `older_than` (spec §4.F; the sweeper picks the horizon).
    pub async fn expire_stale(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64, StorageError> {
        self.storage.expire_stale_requests(older_than).await
    }

    pub async fn get(&self, request_id: Uuid) -> Result<GenerationRequest, StorageError> {
        self.storage.get_generation_request(request_id).await
    }

    pub async fn list(&self, filter: &GenerationRequestFilter) -> Result<Vec<GenerationRequest>, StorageError> {
        self.storage.list_generation_requests(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FakeStorage;

    #[tokio::test]
    async fn finalize_waits_until_counters_are_exhaustive() {
        let storage = Arc::new(FakeStorage::new());
        let tracker = RequestTracker::new(storage.clone());
        let request = tracker
            .create(EntityType::Problem, 2, serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();

        tracker.increment_generated(request.id).await.unwrap();
        assert!(tracker.finalize_if_done(request.id).await.unwrap().is_none());

        tracker.increment_failed(request.id).await.unwrap();
        let finalized = tracker.finalize_if_done(request.id).await.unwrap().unwrap();
        assert_eq!(finalized.status, RequestStatus::Partial);
    }

    #[tokio::test]
    async fn finalize_chooses_failed_when_nothing_generated() {
        let storage = Arc::new(FakeStorage::new());
        let tracker = RequestTracker::new(storage.clone());
        let request = tracker
            .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();
        tracker.increment_failed(request.id).await.unwrap();
        let finalized = tracker.finalize_if_done(request.id).await.unwrap().unwrap();
        assert_eq!(finalized.status, RequestStatus::Failed);
    }
}
