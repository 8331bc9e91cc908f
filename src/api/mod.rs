//! HTTP API (spec §6), grounded on the teacher's `axum` `Router` +
//! `State<SharedState>` idiom (`api_server.rs`) generalized to this
//! service's authenticated, rate-limited problem/generation-request
//! surface.

pub mod auth;
mod handlers;
pub mod rate_limit;
pub mod state;

pub use state::{ApiState, SharedState};

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let protected = Router::new()
        .route("/api/v1/problems/random", get(handlers::problems::random_problem))
        .route("/api/v1/problems/generate", post(handlers::problems::generate_problems))
        .route("/api/v1/problems/{id}", get(handlers::problems::get_problem))
        .route(
            "/api/v1/generation-requests/{id}",
            get(handlers::generation_requests::get_generation_request),
        )
        .route(
            "/api/v1/generation-requests",
            get(handlers::generation_requests::list_generation_requests),
        )
        .route("/api/v1/cache/stats", get(handlers::cache::cache_stats))
        .route("/api/v1/cache/reload", post(handlers::cache::reload_cache))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .route("/api/v1/health", get(handlers::health::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: SharedState, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "HTTP API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
