//! GenerationRequest entity and lifecycle (spec §3, §4.E, §4.F).

use serde::{Deserialize, Serialize};

use super::{EntityId, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Problem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed
                | RequestStatus::Partial
                | RequestStatus::Failed
                | RequestStatus::Expired
        )
    }

    /// The terminal status chosen once `generated + failed == requested`
    /// (spec §4.E/§4.F/§8 invariant 3).
    pub fn from_counts(generated: u32, failed: u32) -> Self {
        if failed == 0 {
            RequestStatus::Completed
        } else if generated == 0 {
            RequestStatus::Failed
        } else {
            RequestStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub status: RequestStatus,
    pub requested_count: u32,
    pub generated_count: u32,
    pub failed_count: u32,
    pub requested_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    pub constraints: serde_json::Value,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
}

impl GenerationRequest {
    pub fn new(entity_type: EntityType, requested_count: u32, constraints: serde_json::Value, metadata: serde_json::Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            entity_type,
            status: RequestStatus::Pending,
            requested_count,
            generated_count: 0,
            failed_count: 0,
            requested_at: now,
            started_at: None,
            completed_at: None,
            constraints,
            metadata,
            error_message: None,
        }
    }

    /// Invariant 3 of spec §8: terminal requests satisfy
    /// `generated + failed = requested`.
    pub fn is_done(&self) -> bool {
        self.generated_count + self.failed_count >= self.requested_count
    }
}
