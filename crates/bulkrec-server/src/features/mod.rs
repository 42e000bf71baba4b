//! HTTP feature slices
//!
//! Each feature owns its routes and its command handlers:
//!
//! - **ingest**: bulk file submission, JSON or streamed progress
//! - **apply**: applies one staged chunk to the canonical store
//!
//! The apply slice is only mounted when a database is configured.

pub mod apply;
pub mod ingest;

use axum::Router;
use std::sync::Arc;

use crate::apply::ApplyService;
use crate::ingest::IngestPipeline;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub pipeline: Arc<IngestPipeline>,
    pub apply: Option<Arc<ApplyService>>,
}

/// Feature routes, to be nested under `/api/v1`
pub fn router(state: FeatureState) -> Router<()> {
    let staging_prefix = state.pipeline.config().staging_prefix.clone();
    let router = Router::new().nest(
        "/ingest",
        ingest::ingest_routes().with_state(state.pipeline),
    );

    match state.apply {
        Some(service) => router.nest(
            "/apply",
            apply::apply_routes().with_state(apply::ApplyState {
                service,
                staging_prefix,
            }),
        ),
        None => router,
    }
}
