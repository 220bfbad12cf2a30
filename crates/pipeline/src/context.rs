use std::sync::Arc;

use lookbook_core::gateway::ModelGateway;
use lookbook_core::ledger::ProgressLedger;
use lookbook_core::storage::BlobStore;

use crate::config::PipelineConfig;

/// Service handles and settings shared by every stage.
///
/// Built once at process start and lent to stages by reference. Cloning
/// only copies the service handles.
#[derive(Clone)]
pub struct PipelineContext {
    pub gateway: Arc<dyn ModelGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub ledger: Arc<dyn ProgressLedger>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn ProgressLedger>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            blobs,
            ledger,
            config,
        }
    }
}
