use std::sync::Arc;

use lattice_agent::HybridAgent;
use lattice_core::{AppConfig, GraphStore, VectorStore};
use lattice_ingest::IngestPipeline;
use lattice_staging::FileStagingStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub staging: Arc<FileStagingStore>,
    pub pipeline: Arc<IngestPipeline>,
    pub agent: Arc<HybridAgent>,
}
