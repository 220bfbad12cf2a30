use lookbook_core::error::CoreError;
use lookbook_core::gateway::GatewayError;
use lookbook_core::ledger::LedgerError;
use lookbook_core::storage::StorageError;

/// Stage-fatal errors. Per-task try-on failures never surface here; they
/// are reported inside [`BatchOutcome`](crate::BatchOutcome).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The progress channel itself is broken; watchers can no longer see
    /// job status, so the stage stops.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),

    #[error("Invalid model completion: {0}")]
    InvalidCompletion(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Core(CoreError::Validation(errors.to_string()))
    }
}
