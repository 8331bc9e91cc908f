use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::{require_permission, AuthenticatedKey};
use crate::api::state::SharedState;
use crate::broker::GenerationMessage;
use crate::domain::{EntityType, Permission, Problem};
use crate::storage::ProblemFilter;
use crate::AppError;

#[derive(Debug, Deserialize)]
pub struct RandomProblemQuery {
    pub problem_type: Option<String>,
    pub grammatical_focus: Option<String>,
    pub tenses_used: Option<String>,
    pub topic_tags: Option<String>,
    pub target_language_code: Option<String>,
}

fn split_comma_list(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

fn parse_problem_type(value: &Option<String>) -> Result<Option<crate::domain::ProblemType>, AppError> {
    match value.as_deref() {
        None => Ok(None),
        Some("grammar") => Ok(Some(crate::domain::ProblemType::Grammar)),
        Some("functional") => Ok(Some(crate::domain::ProblemType::Functional)),
        Some("vocabulary") => Ok(Some(crate::domain::ProblemType::Vocabulary)),
        Some(other) => Err(AppError::Validation(format!("unknown problem_type {other}"))),
    }
}

pub async fn random_problem(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Query(query): Query<RandomProblemQuery>,
) -> Result<Json<Problem>, AppError> {
    require_permission(&key, Permission::Read)?;

    let filter = ProblemFilter {
        problem_type: parse_problem_type(&query.problem_type)?,
        grammatical_focus: split_comma_list(&query.grammatical_focus),
        tenses_used: split_comma_list(&query.tenses_used),
        topic_tags: split_comma_list(&query.topic_tags),
        target_language_code: query.target_language_code,
    };

    let problem = state
        .selector
        .select(filter)
        .await?
        .ok_or_else(|| AppError::NotFound("no problem matches the given predicate".to_string()))?;

    Ok(Json(problem))
}

pub async fn get_problem(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Path(id): Path<Uuid>,
) -> Result<Json<Problem>, AppError> {
    require_permission(&key, Permission::Read)?;
    let problem = state.storage.get_problem(id).await?;
    Ok(Json(problem))
}

#[derive(Debug, Deserialize)]
pub struct GenerateProblemsRequest {
    pub count: u32,
    #[serde(default)]
    pub constraints: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct GenerateProblemsResponse {
    pub request_id: Uuid,
    pub count: u32,
    pub status: &'static str,
}

/// Enqueues `count` generation messages and always returns `202` once the
/// broker publish succeeds — partial outcomes are discovered by polling
/// the request, never by blocking this call (spec §6, §7).
pub async fn generate_problems(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Json(body): Json<GenerateProblemsRequest>,
) -> Result<(StatusCode, Json<GenerateProblemsResponse>), AppError> {
    require_permission(&key, Permission::Write)?;

    if body.count < 1 || body.count > 10 {
        return Err(AppError::Validation("count must be between 1 and 10".to_string()));
    }

    let constraints = body.constraints.clone().unwrap_or_else(|| serde_json::json!({}));
    let request = state
        .tracker
        .create(EntityType::Problem, body.count, constraints.clone(), serde_json::json!({}))
        .await?;

    for _ in 0..body.count {
        let message = GenerationMessage {
            generation_request_id: request.id,
            count: 1,
            constraints: Some(constraints.clone()),
        };
        if let Err(error) = state
            .broker
            .publish(crate::broker::GENERATION_REQUESTS_TOPIC, &request.id.to_string(), &message)
            .await
        {
            // Spec §8 boundary behaviour: a broker failure at publish time
            // must leave no request record behind, not a dangling `pending`
            // one nobody will ever finalize.
            if let Err(cleanup_error) = state.storage.delete_generation_request(request.id).await {
                tracing::warn!(%cleanup_error, request_id = %request.id, "failed to roll back generation request after broker publish failure");
            }
            return Err(AppError::BrokerUnavailable(error.to_string()));
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateProblemsResponse { request_id: request.id, count: body.count, status: "pending" }),
    ))
}
