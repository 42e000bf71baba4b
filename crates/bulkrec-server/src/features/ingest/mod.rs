//! Bulk file submission: `POST /api/v1/ingest`
//!
//! The response is either the final job report as JSON, or a live
//! `text/event-stream` of progress events ending in the report.

pub mod commands;
pub mod routes;


pub use routes::ingest_routes;
