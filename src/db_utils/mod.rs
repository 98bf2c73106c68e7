pub mod connection_manager;
pub mod pipeline_state_repository;

pub use connection_manager::{apply_schema, has_column, open_in_memory_pool, open_pool};
pub use pipeline_state_repository::{PipelineStateRepository, StaleAttempt};
