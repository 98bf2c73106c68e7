use async_trait::async_trait;
use log::info;

use crate::constants::{DEFAULT_DATACOLUMN, SPLITS_DIR_NAME};
use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::manifest::{TaskManifest, build_split_tasks};
use crate::jobs::processors::utils::{UnitDir, casa_manifest_request};
use crate::jobs::validators::validate_split;
use crate::models::{MousId, PipelineStateRecord, Stage};

/// Splits every calibrated product into per-target measurement sets in a CASA session.
pub struct SplitProcessor;

#[async_trait]
impl StageProcessor for SplitProcessor {
    fn stage(&self) -> Stage {
        Stage::Split
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        let products = validate_split(record)?;
        if products.is_empty() {
            return Err(AppError::ValidationError(format!("No calibrated products recorded for {}", mous_id)));
        }
        let config = &ctx.config;
        let unit = UnitDir::from_record(config, mous_id, record)?;

        let spw_mapping = ctx.repo.get_spw_mapping(mous_id).await?;
        info!("[{}] Science spectral windows per target: {:?}", mous_id, spw_mapping);

        let datacolumn = record
            .preferred_datacolumn
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_DATACOLUMN);
        info!("[{}] Splitting with datacolumn '{}'", mous_id, datacolumn);

        let manifest = TaskManifest {
            unit_id: mous_id.database_form(),
            db_path: config.storage_db_path(),
            datasets_dir: config.namespaces.to_storage_path(&config.datasets_dir),
            tasks: build_split_tasks(&products, &spw_mapping, datacolumn, &unit.storage, false)?,
        };

        std::fs::create_dir_all(unit.execution_child(SPLITS_DIR_NAME))?;
        let manifest_name = format!("{}_splits.json", unit.fs_id);
        manifest.write_to(&unit.execution_child(&manifest_name))?;

        let request = casa_manifest_request(
            config,
            mous_id,
            &unit,
            "splits",
            &config.scripts.split,
            &unit.storage_child(&manifest_name),
        );
        let job_id = ctx.run_remote_job(mous_id, &request).await?;

        let outputs = manifest.split_outputs();
        ctx.repo.set_split_products(mous_id, &outputs).await?;

        Ok(StageOutcome::from_job(
            job_id,
            format!("{} split products from {} calibrated products", outputs.len(), products.len()),
        ))
    }
}
