use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::manifest::{TaskManifest, build_listobs_tasks};
use crate::jobs::processors::utils::{UnitDir, casa_manifest_request};
use crate::jobs::validators::validate_listobs;
use crate::models::{MousId, PipelineStateRecord, Stage};

/// Writes a listobs summary next to every calibrated and split product.
pub struct ListobsProcessor;

#[async_trait]
impl StageProcessor for ListobsProcessor {
    fn stage(&self) -> Stage {
        Stage::Listobs
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        let inputs = validate_listobs(record)?;
        let config = &ctx.config;
        let unit = UnitDir::from_record(config, mous_id, record)?;

        let products: Vec<&String> = inputs
            .calibrated_products
            .iter()
            .chain(inputs.split_products.iter())
            .collect();
        let tasks = build_listobs_tasks(&products);
        if tasks.is_empty() {
            return Err(AppError::ValidationError(format!("No products to summarise for {}", mous_id)));
        }

        let manifest = TaskManifest {
            unit_id: mous_id.database_form(),
            db_path: config.storage_db_path(),
            datasets_dir: config.namespaces.to_storage_path(&config.datasets_dir),
            tasks,
        };
        let manifest_name = format!("{}_listobs.json", unit.fs_id);
        manifest.write_to(&unit.execution_child(&manifest_name))?;

        let request = casa_manifest_request(
            config,
            mous_id,
            &unit,
            "listobs",
            &config.scripts.listobs,
            &unit.storage_child(&manifest_name),
        );
        let job_id = ctx.run_remote_job(mous_id, &request).await?;

        Ok(StageOutcome::from_job(
            job_id,
            format!("listobs written for {} products", manifest.tasks.len()),
        ))
    }
}
