use log::debug;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::jobs::executor::StageProcessor;
use crate::jobs::processors::{
    DownloadProcessor, ListobsProcessor, PostDownloadOrganizeProcessor, PostSelfcalCleanupProcessor,
    PostSplitOrganizeProcessor, SelfcalPrepProcessor, SelfcalProcessor, SplitProcessor,
};
use crate::models::Stage;

/// Registry for stage processors
#[derive(Default)]
pub struct StageRegistry {
    processors: Mutex<Vec<Arc<dyn StageProcessor>>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            processors: Mutex::new(Vec::new()),
        }
    }

    /// A registry holding one processor for every stage.
    pub async fn with_default_processors() -> Self {
        let registry = Self::new();
        let processors: [Arc<dyn StageProcessor>; 8] = [
            Arc::new(DownloadProcessor),
            Arc::new(PostDownloadOrganizeProcessor),
            Arc::new(SplitProcessor),
            Arc::new(PostSplitOrganizeProcessor),
            Arc::new(ListobsProcessor),
            Arc::new(SelfcalPrepProcessor),
            Arc::new(SelfcalProcessor),
            Arc::new(PostSelfcalCleanupProcessor),
        ];
        for processor in processors {
            registry.register(processor).await;
        }
        registry
    }

    /// Register a processor. A later registration for the same stage wins.
    pub async fn register(&self, processor: Arc<dyn StageProcessor>) {
        debug!("Registering stage processor: {}", processor.name());
        let mut processors = self.processors.lock().await;
        processors.insert(0, processor);
    }

    pub async fn find_processor(&self, stage: Stage) -> AppResult<Arc<dyn StageProcessor>> {
        let processors = self.processors.lock().await;
        processors
            .iter()
            .find(|processor| processor.can_handle(stage))
            .cloned()
            .ok_or_else(|| AppError::InternalError(format!("No processor registered for stage: {}", stage)))
    }
}
