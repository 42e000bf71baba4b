//! Top-level router: health probe, versioned feature routes and the
//! middleware stack shared by every request.

pub mod response;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::apply::ApplyService;
use crate::config::Config;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::features;
use crate::ingest::IngestPipeline;
use crate::middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    /// Present when this process applies chunks itself
    pub apply: Option<Arc<ApplyService>>,
    pub db: Option<PgPool>,
}

/// Create the application router with all routes and middleware
pub fn router(state: AppState, config: &Config) -> Router {
    let feature_routes = features::router(features::FeatureState {
        pipeline: state.pipeline.clone(),
        apply: state.apply.clone(),
    });

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .nest("/api/v1", feature_routes)
        .fallback(not_found)
        // Apply layers from innermost to outermost
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::body_limit_layer(config.server.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let database = match &state.db {
        Some(pool) => {
            db::health_check(pool).await?;
            "connected"
        },
        None => "not configured",
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "applyMode": state.pipeline.config().apply_mode,
        })),
    ))
}

async fn not_found() -> AppError {
    AppError::NotFound("No such route".to_string())
}
