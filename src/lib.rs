pub mod utils;
pub mod models;
pub mod pipeline;
pub mod api;

use std::sync::Arc;

use pipeline::PipelineResources;

#[derive(Clone)]
pub struct AppState {
    pub started_at: std::time::Instant,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    /// `None` until the model artifacts are loaded; requests then answer
    /// with the not-loaded error instead of running inference.
    pub resources: Option<Arc<PipelineResources>>,
}

impl AppState {
    pub fn new(cfg: &utils::config::Config, resources: PipelineResources) -> Self {
        Self {
            started_at: std::time::Instant::now(),
            cors_origins: cfg.cors_origins.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
            resources: Some(Arc::new(resources)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.resources.is_some()
    }
}
