//! Bulk ingestion pipeline
//!
//! # Architecture
//!
//! - **normalizer**: encoding detection and canonical header replacement
//! - **chunker**: order-preserving partition into bounded chunks
//! - **stager**: durable chunk handoff (`ChunkStore` over S3 or memory)
//! - **invoker**: apply step invocation (HTTP or in-process)
//! - **orchestrator**: sequential per-chunk processing with failure isolation
//! - **progress**: in-order event delivery to the submitting caller
//! - **sweep**: background removal of orphaned staged chunks
//!
//! Configuration is read from `INGEST_*` environment variables, see
//! [`PipelineConfig::from_env`].

pub mod aggregate;
pub mod chunker;
pub mod config;
pub mod error;
pub mod invoker;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod schema;
pub mod stager;
pub mod sweep;

pub use aggregate::JobAggregate;
pub use chunker::{partition, Chunk};
pub use config::{ApplyMode, JobOverrides, PipelineConfig, StagingBackend};
pub use error::IngestError;
pub use invoker::{ApplyInvoker, HttpApplyInvoker, InProcessApplyInvoker, InvokeError};
pub use normalizer::{normalize, EncodingPolicy, NormalizedText, RawInput, SourceRow};
pub use orchestrator::{IngestPipeline, PreparedJob};
pub use progress::{ProgressPublisher, ProgressSubscriber};
pub use schema::{Field, FIELD_COUNT};
pub use stager::{ChunkStore, MemoryChunkStore, StageError, StagedObject, StagedReference};
pub use sweep::StagingSweeper;
