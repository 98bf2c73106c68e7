use async_trait::async_trait;
use log::info;

use crate::api_clients::JobRequest;
use crate::constants::AUTO_SELFCAL_DIR_NAME;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::processors::utils::UnitDir;
use crate::jobs::validators::validate_selfcal_prep;
use crate::models::{MousId, PipelineStateRecord, Stage};
use crate::utils::date_utils::job_name_stamp;

/// Stages split products into the unit's auto_selfcal working directory.
pub struct SelfcalPrepProcessor;

#[async_trait]
impl StageProcessor for SelfcalPrepProcessor {
    fn stage(&self) -> Stage {
        Stage::SelfcalPrep
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        let mous_dir = validate_selfcal_prep(record)?;
        let config = &ctx.config;
        let unit = UnitDir::from_storage(config, mous_id, &mous_dir);

        if record.split_products_path.is_empty() {
            return Err(AppError::ValidationError(format!("No split products recorded for {}", mous_id)));
        }

        let workdir = unit.execution_child(AUTO_SELFCAL_DIR_NAME);
        std::fs::create_dir_all(&workdir)?;
        info!("[{}] Prepared working directory {}", mous_id, workdir.display());

        let mut args = vec![
            mous_id.database_form(),
            config.storage_db_path(),
            unit.storage_child(AUTO_SELFCAL_DIR_NAME),
        ];
        args.extend(record.split_products_path.iter().cloned());

        let request = JobRequest::new(
            format!("wget2-{}-autoselfcal-prep", job_name_stamp()),
            config.transfer_image.clone(),
            config.storage_script(&config.scripts.selfcal_prep),
            args,
        );
        let job_id = ctx.run_remote_job(mous_id, &request).await?;

        Ok(StageOutcome::from_job(
            job_id,
            format!("staged {} split products for self-calibration", record.split_products_path.len()),
        ))
    }
}
