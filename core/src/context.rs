use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ProgressError;
use crate::executor::RunRenderer;
use crate::orchestrator::{Orchestrator, Pipeline};
use crate::state::{ProgressManager, ProgressStore};

/// Process-wide services shared by every run: configuration, the progress
/// store and the optional renderer.
#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    store: Arc<dyn ProgressStore>,
    renderer: Option<Arc<dyn RunRenderer>>,
}

impl AppContext {
    /// Build the progress store described by `cfg.progress`.
    pub fn new(cfg: AppConfig) -> Result<Self, ProgressError> {
        let store = ProgressManager::from_config(&cfg.progress)?;
        Ok(Self::with_store(cfg, Arc::new(store)))
    }

    pub fn with_store(cfg: AppConfig, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            cfg,
            store,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn RunRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn store(&self) -> Arc<dyn ProgressStore> {
        self.store.clone()
    }

    pub fn renderer(&self) -> Option<Arc<dyn RunRenderer>> {
        self.renderer.clone()
    }

    /// Orchestrator for `pipeline` wired to this context's store, renderer and
    /// executor limits.
    pub fn orchestrator<C>(&self, pipeline: Pipeline<C>) -> Orchestrator<C>
    where
        C: Send + Sync + 'static,
    {
        let orchestrator = Orchestrator::new(pipeline, self.store.clone())
            .with_max_parallel(self.cfg.executor.max_parallel_tasks);
        match &self.renderer {
            Some(renderer) => orchestrator.with_renderer(renderer.clone()),
            None => orchestrator,
        }
    }
}
