pub mod apply_chunk;

pub use apply_chunk::{ApplyChunkCommand, ApplyChunkError};
