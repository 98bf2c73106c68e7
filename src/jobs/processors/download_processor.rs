use async_trait::async_trait;
use log::{info, warn};

use crate::error::AppResult;
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::validators::validate_download;
use crate::models::{MousId, PipelineStateRecord, Stage};

/// Fetches a unit's archive into a fresh staging directory under the datasets root.
pub struct DownloadProcessor;

#[async_trait]
impl StageProcessor for DownloadProcessor {
    fn stage(&self) -> Stage {
        Stage::Download
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        let url = validate_download(record)?;
        let fs_id = mous_id.filesystem_form();

        std::fs::create_dir_all(&ctx.config.datasets_dir)?;
        // removed on drop unless the fetch succeeds
        let staging_dir = tempfile::Builder::new()
            .prefix(&format!("{}_", fs_id))
            .tempdir_in(&ctx.config.datasets_dir)?;
        info!("[{}] Created staging directory {}", mous_id, staging_dir.path().display());

        if let Err(e) = ctx.fetcher.fetch_archive(mous_id, &url, staging_dir.path()).await {
            warn!("[{}] Fetch failed, discarding {}", mous_id, staging_dir.path().display());
            return Err(e);
        }
        let staging = staging_dir.keep();

        let staging_storage = ctx.config.namespaces.to_storage_path(&staging);
        ctx.repo.set_mous_directory(mous_id, &staging_storage).await?;
        info!("[{}] Archive staged at {}", mous_id, staging_storage);

        Ok(StageOutcome::with_notes(format!(
            "fetched with {} into {}",
            ctx.fetcher.name(),
            staging_storage
        )))
    }
}
