use async_trait::async_trait;
use log::{info, warn};

use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::validators::validate_post_download_organize;
use crate::models::{MousId, PipelineStateRecord, Stage};
use crate::utils::fs_utils::{organize_artifacts, remove_path};

/// Moves downloaded data products and report bundles out of the staging
/// directory into the unit's canonical directories.
pub struct PostDownloadOrganizeProcessor;

#[async_trait]
impl StageProcessor for PostDownloadOrganizeProcessor {
    fn stage(&self) -> Stage {
        Stage::PostDownloadOrganize
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        let staging_storage = validate_post_download_organize(record)?;
        let config = &ctx.config;
        let staging = config.namespaces.to_execution_path(&staging_storage);
        let fs_id = mous_id.filesystem_form();
        let data_root = config.unit_dir(&fs_id);
        let report_root = config.unit_weblog_dir(&fs_id);

        let label = mous_id.database_form();
        let staging_dir = staging.clone();
        let organized = tokio::task::spawn_blocking(move || {
            organize_artifacts(&label, &staging_dir, &data_root, &report_root)
        })
        .await
        .map_err(|e| AppError::InternalError(format!("Organize task panicked: {}", e)))??;

        let unit_storage = config.namespaces.to_storage_path(config.unit_dir(&fs_id));
        let products = config.namespaces.to_storage_paths(&organized.data_products);

        ctx.repo.set_mous_directory(mous_id, &unit_storage).await?;
        ctx.repo.set_calibrated_products(mous_id, &products).await?;

        let notes = format!(
            "organized {} data products and {} report bundles",
            products.len(),
            organized.report_bundles.len()
        );
        ctx.repo
            .mirror_download(mous_id, "complete", Some(&unit_storage), Some(&notes))
            .await?;
        info!("[{}] {} into {}", mous_id, notes, unit_storage);

        if config.remove_staging_dirs {
            match remove_path(&staging) {
                Ok(()) => info!("[{}] Removed staging directory {}", mous_id, staging.display()),
                Err(e) => warn!("[{}] Failed to remove staging directory {}: {}", mous_id, staging.display(), e),
            }
        }

        Ok(StageOutcome::with_notes(notes))
    }
}
