pub mod submit;

pub use submit::{SubmitIngestCommand, SubmitIngestError};
