//! Server-level error types
//!
//! Feature slices map their own errors; this covers the router itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::response::ErrorResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_UNAVAILABLE"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Health probe could not reach the database");
                "The database is unavailable".to_string()
            },
            AppError::NotFound(message) => message,
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, AppError>;
