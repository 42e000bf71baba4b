//! Apply endpoint: `POST /api/v1/apply`

pub mod commands;
pub mod routes;

pub use routes::{apply_routes, ApplyState};
