use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::{require_permission, AuthenticatedKey};
use crate::api::state::SharedState;
use crate::domain::{EntityType, GenerationRequest, Permission, RequestStatus};
use crate::storage::GenerationRequestFilter;
use crate::AppError;

#[derive(Debug, Serialize)]
pub struct GenerationRequestView {
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub problems: Vec<Uuid>,
}

pub async fn get_generation_request(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationRequestView>, AppError> {
    require_permission(&key, Permission::Read)?;
    let request = state.tracker.get(id).await?;
    let problems = state.storage.list_problems_for_request(id).await?.into_iter().map(|p| p.id).collect();
    Ok(Json(GenerationRequestView { request, problems }))
}

#[derive(Debug, Deserialize)]
pub struct ListGenerationRequestsQuery {
    pub status: Option<String>,
    pub entity_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn parse_entity_type(value: &Option<String>) -> Result<Option<EntityType>, AppError> {
    match value.as_deref() {
        None => Ok(None),
        Some("problem") => Ok(Some(EntityType::Problem)),
        Some(other) => Err(AppError::Validation(format!("unknown entity_type {other}"))),
    }
}

fn parse_status(value: &Option<String>) -> Result<Option<RequestStatus>, AppError> {
    match value.as_deref() {
        None => Ok(None),
        Some("pending") => Ok(Some(RequestStatus::Pending)),
        Some("processing") => Ok(Some(RequestStatus::Processing)),
        Some("completed") => Ok(Some(RequestStatus::Completed)),
        Some("partial") => Ok(Some(RequestStatus::Partial)),
        Some("failed") => Ok(Some(RequestStatus::Failed)),
        Some("expired") => Ok(Some(RequestStatus::Expired)),
        Some(other) => Err(AppError::Validation(format!("unknown status {other}"))),
    }
}

pub async fn list_generation_requests(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Query(query): Query<ListGenerationRequestsQuery>,
) -> Result<Json<Vec<GenerationRequest>>, AppError> {
    require_permission(&key, Permission::Read)?;

    let filter = GenerationRequestFilter {
        status: parse_status(&query.status)?,
        entity_type: parse_entity_type(&query.entity_type)?,
    };
    let mut requests = state.tracker.list(&filter).await?;
    if let Some(limit) = query.limit {
        requests.truncate(limit);
    }
    Ok(Json(requests))
}
