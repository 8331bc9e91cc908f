use axum::extract::{Extension, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::auth::{require_permission, AuthenticatedKey};
use crate::api::state::SharedState;
use crate::cache::CacheStats;
use crate::domain::Permission;
use crate::AppError;

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub verb: CacheStats,
    pub conjugation: CacheStats,
    pub key: CacheStats,
}

pub async fn cache_stats(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
) -> Result<Json<CacheStatsResponse>, AppError> {
    require_permission(&key, Permission::Admin)?;
    Ok(Json(CacheStatsResponse {
        verb: state.verb_cache.stats().await,
        conjugation: state.conjugation_cache.stats().await,
        key: state.key_cache.stats().await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReloadCacheQuery {
    pub which: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadCacheResponse {
    pub reloaded: Vec<&'static str>,
}

pub async fn reload_cache(
    State(state): State<SharedState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    Query(query): Query<ReloadCacheQuery>,
) -> Result<Json<ReloadCacheResponse>, AppError> {
    require_permission(&key, Permission::Admin)?;

    let mut reloaded = Vec::new();
    match query.which.as_deref() {
        Some("verb") => {
            state.verb_cache.reload_all().await?;
            reloaded.push("verb");
        }
        Some("conjugation") => {
            state.conjugation_cache.reload_all().await?;
            reloaded.push("conjugation");
        }
        Some("key") => {
            state.key_cache.reload_all().await?;
            reloaded.push("key");
        }
        Some(other) => return Err(AppError::Validation(format!("unknown cache {other}"))),
        None => {
            state.verb_cache.reload_all().await?;
            state.conjugation_cache.reload_all().await?;
            state.key_cache.reload_all().await?;
            reloaded.extend(["verb", "conjugation", "key"]);
        }
    }

    Ok(Json(ReloadCacheResponse { reloaded }))
}
