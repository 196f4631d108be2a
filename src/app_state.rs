use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::AnalysisPipeline;
use crate::services::storage::LocalImageStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub store: Arc<LocalImageStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<AnalysisPipeline>, store: Arc<LocalImageStore>, config: AppConfig) -> Self {
        Self {
            pipeline,
            store,
            config: Arc::new(config),
        }
    }
}
