use async_trait::async_trait;
use log::{info, warn};

use crate::config::PipelineConfig;
use crate::constants::{AUTO_SELFCAL_DIR_NAME, SELFCAL_KEEP_PATTERNS};
use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::processors::utils::UnitDir;
use crate::jobs::validators::validate_post_selfcal_cleanup;
use crate::models::{MousId, PipelineStateRecord, Stage};
use crate::utils::fs_utils::{CleanupReport, cleanup_directory};

/// Prunes intermediate files from the auto_selfcal working directory.
pub struct PostSelfcalCleanupProcessor;

/// Run the cleanup (or preview it with `dry_run`). `Ok(None)` when the
/// working directory is missing.
pub async fn cleanup_selfcal_dir(
    config: &PipelineConfig,
    mous_id: &MousId,
    record: &PipelineStateRecord,
    dry_run: bool,
) -> AppResult<Option<CleanupReport>> {
    let unit = UnitDir::from_record(config, mous_id, record)?;
    let workdir = unit.execution_child(AUTO_SELFCAL_DIR_NAME);
    if !workdir.is_dir() {
        warn!("[{}] Directory does not exist: {}", mous_id, workdir.display());
        return Ok(None);
    }

    let report = tokio::task::spawn_blocking(move || cleanup_directory(&workdir, SELFCAL_KEEP_PATTERNS, dry_run))
        .await
        .map_err(|e| AppError::InternalError(format!("Cleanup task panicked: {}", e)))??;
    Ok(Some(report))
}

#[async_trait]
impl StageProcessor for PostSelfcalCleanupProcessor {
    fn stage(&self) -> Stage {
        Stage::PostSelfcalCleanup
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        validate_post_selfcal_cleanup(record)?;
        let notes = match cleanup_selfcal_dir(&ctx.config, mous_id, record, false).await? {
            Some(report) => format!("removed {} entries, kept {}", report.removed.len(), report.kept.len()),
            None => "auto_selfcal directory missing, nothing to clean".to_string(),
        };
        info!("[{}] Cleanup finished: {}", mous_id, notes);
        Ok(StageOutcome::with_notes(notes))
    }
}
