//! Apply step
//!
//! Reads a staged chunk, coerces each row to its typed form and reconciles the
//! rows into `canonical_records`. Served over HTTP at `/api/v1/apply` and
//! callable in-process by the ingest pipeline.

pub mod coerce;
pub mod reconcile;
pub mod service;

pub use coerce::{coerce, CanonicalRow, CoerceError};
pub use reconcile::{CanonicalStore, PgCanonicalStore, ReconcileError, ReconcileSummary};
pub use service::{ApplyError, ApplyService};
