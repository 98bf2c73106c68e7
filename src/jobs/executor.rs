use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;

use crate::api_clients::{ArchiveFetcher, JobRequest, SessionClient};
use crate::config::PipelineConfig;
use crate::db_utils::PipelineStateRepository;
use crate::error::{AppError, AppResult};
use crate::jobs::monitor::JobMonitor;
use crate::jobs::retry_utils::submit_with_config;
use crate::jobs::validators::check_stage;
use crate::models::{MousId, PipelineStateRecord, Stage};

/// Shared collaborators handed to every stage processor.
pub struct StageContext {
    pub config: Arc<PipelineConfig>,
    pub repo: Arc<PipelineStateRepository>,
    pub session_client: Arc<dyn SessionClient>,
    pub fetcher: Arc<dyn ArchiveFetcher>,
}

impl StageContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        repo: Arc<PipelineStateRepository>,
        session_client: Arc<dyn SessionClient>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            config,
            repo,
            session_client,
            fetcher,
        }
    }

    pub fn monitor(&self) -> JobMonitor {
        JobMonitor::from_config(Arc::clone(&self.session_client), &self.config)
    }

    /// Launch `request` (with submission retries) and wait for it to succeed.
    /// Returns the job handle.
    pub async fn run_remote_job(&self, mous_id: &MousId, request: &JobRequest) -> AppResult<String> {
        let job_id = submit_with_config(self.session_client.as_ref(), request, &self.config).await?;
        info!("[{}] Launched job '{}' with ID {}", mous_id, request.name, job_id);
        self.monitor().wait_for_completion(&job_id).await?;
        info!("[{}] Job {} succeeded", mous_id, job_id);
        Ok(job_id)
    }
}

/// What a processor reports back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub notes: Option<String>,
    pub job_id: Option<String>,
}

impl StageOutcome {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            job_id: None,
        }
    }

    pub fn from_job(job_id: String, notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            job_id: Some(job_id),
        }
    }
}

/// Performs the work of one stage for one unit.
///
/// Processors never touch the stage's status column; [`execute_stage`] owns
/// the claim and the terminal write.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    fn stage(&self) -> Stage;

    fn name(&self) -> &'static str {
        self.stage().as_str()
    }

    fn can_handle(&self, stage: Stage) -> bool {
        self.stage() == stage
    }

    fn validate(&self, record: &PipelineStateRecord) -> AppResult<()> {
        check_stage(self.stage(), record)
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome>;
}

/// Run one stage for one unit.
///
/// Re-validates against a fresh read, claims the status column by
/// compare-and-swap, runs the processor, then writes the success label or
/// `error` for that claim only. Losing the claim is reported as a precondition
/// failure with no state change, and so is finishing after the attempt was
/// expired or re-claimed: its result is dropped. Any other failure leaves the
/// column at `error` and is returned.
pub async fn execute_stage(
    ctx: &StageContext,
    processor: &dyn StageProcessor,
    mous_id: &MousId,
) -> AppResult<StageOutcome> {
    let stage = processor.stage();
    let record = ctx.repo.get_record(mous_id).await?;
    processor.validate(&record)?;

    let Some(claim) = ctx.repo.claim_stage(mous_id, stage).await? else {
        debug!("[{}] Lost the claim on {}", mous_id, stage);
        return Err(AppError::precondition(
            stage.column().status_column(),
            format!("'{}' was claimed by another attempt", stage.claim_from()),
        ));
    };
    info!("[{}] Starting stage {}", mous_id, stage);

    let outcome = match processor.process(ctx, mous_id, &record).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(record_failure(ctx, mous_id, stage, &claim, e).await),
    };

    match ctx.repo.complete_stage(mous_id, stage, &claim, outcome.notes.as_deref()).await {
        Ok(true) => {
            info!("[{}] Stage {} finished: {}", mous_id, stage, stage.success_label());
            Ok(outcome)
        }
        Ok(false) => Err(superseded(stage, &claim)),
        Err(e) => Err(record_failure(ctx, mous_id, stage, &claim, e).await),
    }
}

async fn record_failure(ctx: &StageContext, mous_id: &MousId, stage: Stage, claim: &str, e: AppError) -> AppError {
    error!("[{}] Stage {} failed: {}", mous_id, stage, e);
    let notes = format!("{}: {}", e.code(), e);
    match ctx.repo.fail_stage(mous_id, stage, claim, &notes).await {
        Ok(true) => e,
        Ok(false) => superseded(stage, claim),
        Err(db_err) => {
            error!("[{}] Could not record failure of {}: {}", mous_id, stage, db_err);
            e
        }
    }
}

fn superseded(stage: Stage, claim: &str) -> AppError {
    AppError::precondition(
        stage.column().status_column(),
        format!("attempt claimed at {} is no longer in progress", claim),
    )
}
