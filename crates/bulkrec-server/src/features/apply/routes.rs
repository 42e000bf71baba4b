use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use bulkrec_common::types::{ApplyRequest, ChunkResult};

use super::commands::{apply_chunk, ApplyChunkCommand, ApplyChunkError};
use crate::api::response::ErrorResponse;
use crate::apply::ApplyService;

#[derive(Clone)]
pub struct ApplyState {
    pub service: Arc<ApplyService>,
    pub staging_prefix: String,
}

pub fn apply_routes() -> Router<ApplyState> {
    Router::new().route("/", post(apply_staged_chunk))
}

/// Always 200 once the request is valid; `succeeded` carries the outcome
async fn apply_staged_chunk(
    State(state): State<ApplyState>,
    body: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<Json<ChunkResult>, ApplyApiError> {
    let Json(request) = body?;
    let command = ApplyChunkCommand {
        staged_reference: request.staged_reference,
    };

    let result = apply_chunk::handle(&state.service, &state.staging_prefix, command).await?;
    Ok(Json(result))
}

#[derive(Debug)]
enum ApplyApiError {
    Invalid(ApplyChunkError),
    Body(JsonRejection),
}

impl From<ApplyChunkError> for ApplyApiError {
    fn from(err: ApplyChunkError) -> Self {
        Self::Invalid(err)
    }
}

impl From<JsonRejection> for ApplyApiError {
    fn from(err: JsonRejection) -> Self {
        Self::Body(err)
    }
}

impl IntoResponse for ApplyApiError {
    fn into_response(self) -> Response {
        match self {
            ApplyApiError::Invalid(e) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", e.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            ApplyApiError::Body(e) => {
                let error = ErrorResponse::new("INVALID_BODY", e.body_text());
                (e.status(), Json(error)).into_response()
            },
        }
    }
}
