pub mod dispatcher;
pub mod executor;
pub mod manifest;
pub mod monitor;
pub mod processors;
pub mod registry;
pub mod retry_utils;
pub mod scheduler;
pub mod session_fetcher;
pub mod validators;

pub use dispatcher::{DispatchDecision, DispatchReport, PipelineDispatcher, StageRun};
pub use executor::{StageContext, StageOutcome, StageProcessor, execute_stage};
pub use monitor::JobMonitor;
pub use registry::StageRegistry;
pub use scheduler::{PipelineScheduler, SchedulerState};
pub use session_fetcher::SessionArchiveFetcher;
