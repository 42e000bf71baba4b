use bulkrec_common::types::ChunkResult;

use crate::apply::ApplyService;
use crate::ingest::StagedReference;

#[derive(Debug, Clone)]
pub struct ApplyChunkCommand {
    pub staged_reference: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyChunkError {
    #[error("stagedReference is required and cannot be empty")]
    ReferenceRequired,
    #[error("stagedReference must point under the staging prefix '{0}'")]
    OutsideStaging(String),
}

impl ApplyChunkCommand {
    pub fn validate(&self, staging_prefix: &str) -> Result<(), ApplyChunkError> {
        let reference = self.staged_reference.trim();
        if reference.is_empty() {
            return Err(ApplyChunkError::ReferenceRequired);
        }
        let inside = reference
            .strip_prefix(staging_prefix)
            .is_some_and(|rest| rest.starts_with('/'));
        if !inside || reference.split('/').any(|segment| segment == "..") {
            return Err(ApplyChunkError::OutsideStaging(staging_prefix.to_string()));
        }
        Ok(())
    }
}

#[tracing::instrument(skip(service, command), fields(reference = %command.staged_reference))]
pub async fn handle(
    service: &ApplyService,
    staging_prefix: &str,
    command: ApplyChunkCommand,
) -> Result<ChunkResult, ApplyChunkError> {
    command.validate(staging_prefix)?;

    let reference = StagedReference::new(command.staged_reference.trim());
    Ok(service.apply(&reference).await)
}
