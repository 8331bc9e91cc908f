//! Problem selector (spec §4.H) — weighted-random staleness-LRU retrieval.
//! The scoring itself runs as a single storage query; this module owns
//! the virtual-staleness constant and the fire-and-forget stamp.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Problem;
use crate::storage::{ProblemFilter, StorageError, StorageGateway};

pub struct ProblemSelector {
    storage: Arc<dyn StorageGateway>,
    virtual_staleness_seconds: i64,
}

impl ProblemSelector {
    pub fn new(storage: Arc<dyn StorageGateway>, virtual_staleness_seconds: i64) -> Self {
        Self { storage, virtual_staleness_seconds }
    }

    /// Selects one problem matching `filter`, then stamps `last_served_at`
    /// without waiting for that write to commit (spec §4.H: "the read may
    /// return before the stamp commits").
    pub async fn select(&self, filter: ProblemFilter) -> Result<Option<Problem>, StorageError> {
        let chosen = self
            .storage
            .select_random_problem(&filter, self.virtual_staleness_seconds)
            .await?;

        if let Some(problem) = &chosen {
            self.stamp_fire_and_forget(problem.id);
        }

        Ok(chosen)
    }

    fn stamp_fire_and_forget(&self, id: Uuid) {
        let storage = self.storage.clone();
        tokio::spawn(async move {
            if let Err(error) = storage.stamp_last_served(id).await {
                tracing::warn!(%error, problem_id = %id, "failed to stamp last_served_at");
            }
        });
    }
}
