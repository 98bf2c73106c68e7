use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db_utils::pipeline_state_repository::find_stale_attempts;
use crate::db_utils::StaleAttempt;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, execute_stage};
use crate::jobs::registry::StageRegistry;
use crate::jobs::validators::check_stage;
use crate::models::{MousId, Stage};

/// One eligible (unit, stage) pair found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDecision {
    pub mous_id: String,
    pub stage: Stage,
    /// False in dry-run: the decision was reported but nothing was started.
    pub triggered: bool,
}

/// Result of one stage execution started by a scan.
#[derive(Debug)]
pub struct StageRun {
    pub mous_id: String,
    pub stage: Stage,
    pub result: AppResult<StageOutcome>,
}

/// Everything one scan decided, plus handles to the executions it started.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub decisions: Vec<DispatchDecision>,
    /// Stale attempts moved to `error` (or, in dry-run, that would have been).
    pub expired: Vec<StaleAttempt>,
    pub skipped_units: Vec<String>,
    handles: Vec<(String, Stage, JoinHandle<AppResult<StageOutcome>>)>,
}

impl DispatchReport {
    pub fn triggered_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.triggered).count()
    }

    /// Wait for every execution this scan started.
    pub async fn wait(self) -> Vec<StageRun> {
        let (keys, handles): (Vec<_>, Vec<_>) = self
            .handles
            .into_iter()
            .map(|(mous_id, stage, handle)| ((mous_id, stage), handle))
            .unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(keys)
            .map(|(joined, (mous_id, stage))| StageRun {
                result: joined.unwrap_or_else(|e| Err(AppError::InternalError(format!("Stage task failed: {}", e)))),
                mous_id,
                stage,
            })
            .collect()
    }
}

/// Scans the whole state store and starts every eligible stage.
pub struct PipelineDispatcher {
    ctx: Arc<StageContext>,
    registry: Arc<StageRegistry>,
}

impl PipelineDispatcher {
    pub fn new(ctx: Arc<StageContext>, registry: Arc<StageRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub fn context(&self) -> &Arc<StageContext> {
        &self.ctx
    }

    /// One pass over every unit and every stage.
    ///
    /// Stale `in_progress` attempts are expired first. Each eligible pair is
    /// then handed to [`execute_stage`] on its own task; the scan does not wait
    /// for them. With `dry_run` nothing is written and nothing is started.
    pub async fn scan(&self, dry_run: bool) -> AppResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let threshold = self.ctx.config.stale_after;
        let records = self.ctx.repo.list_records().await?;
        debug!("Scanning {} units", records.len());

        for attempt in find_stale_attempts(&records, threshold) {
            if dry_run {
                info!(
                    "[{}] [dry-run] Would expire {} (in_progress since {})",
                    attempt.mous_id, attempt.column, attempt.started_at
                );
                report.expired.push(attempt);
                continue;
            }
            match self.ctx.repo.expire_attempt(&attempt, threshold).await {
                Ok(true) => report.expired.push(attempt),
                Ok(false) => debug!("[{}] {} no longer stale", attempt.mous_id, attempt.column),
                Err(e) => error!("[{}] Failed to expire {}: {}", attempt.mous_id, attempt.column, e),
            }
        }

        for record in &records {
            let mous_id = match MousId::parse(&record.mous_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping unit with unusable ID: {}", e);
                    report.skipped_units.push(record.mous_id.clone());
                    continue;
                }
            };

            for stage in Stage::ALL {
                if report.expired.iter().any(|a| a.mous_id == record.mous_id && a.column == stage.column()) {
                    continue;
                }
                match check_stage(stage, record) {
                    Ok(()) => {}
                    Err(e) if e.is_precondition() => {
                        debug!("[{}] Not eligible for {}: {}", mous_id, stage, e);
                        continue;
                    }
                    Err(e) => {
                        warn!("[{}] Validation of {} failed: {}", mous_id, stage, e);
                        continue;
                    }
                }

                if dry_run {
                    info!("[{}] [dry-run] Would trigger {}", mous_id, stage);
                    report.decisions.push(DispatchDecision {
                        mous_id: record.mous_id.clone(),
                        stage,
                        triggered: false,
                    });
                    continue;
                }

                let processor = match self.registry.find_processor(stage).await {
                    Ok(processor) => processor,
                    Err(e) => {
                        error!("[{}] {}", mous_id, e);
                        continue;
                    }
                };

                info!("[{}] Triggering {}", mous_id, stage);
                let ctx = Arc::clone(&self.ctx);
                let task_id = mous_id.clone();
                let handle = tokio::spawn(async move {
                    let result = execute_stage(&ctx, processor.as_ref(), &task_id).await;
                    if let Err(e) = &result {
                        if e.is_precondition() {
                            debug!("[{}] {} skipped: {}", task_id, stage, e);
                        }
                    }
                    result
                });

                report.decisions.push(DispatchDecision {
                    mous_id: record.mous_id.clone(),
                    stage,
                    triggered: true,
                });
                report.handles.push((record.mous_id.clone(), stage, handle));
            }
        }

        info!(
            "Scan finished: {} eligible, {} started, {} stale attempts{}",
            report.decisions.len(),
            report.triggered_count(),
            report.expired.len(),
            if dry_run { " (dry-run)" } else { "" }
        );
        Ok(report)
    }

    /// Run one stage for one unit in the foreground.
    pub async fn run_stage(&self, stage: Stage, mous_id: &MousId) -> AppResult<StageOutcome> {
        let processor = self.registry.find_processor(stage).await?;
        execute_stage(&self.ctx, processor.as_ref(), mous_id).await
    }
}
