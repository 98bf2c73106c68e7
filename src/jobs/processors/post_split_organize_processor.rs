use async_trait::async_trait;
use log::info;

use crate::error::{AppError, AppResult};
use crate::jobs::executor::{StageContext, StageOutcome, StageProcessor};
use crate::jobs::processors::utils::ensure_paths_exist;
use crate::jobs::validators::validate_post_split_organize;
use crate::models::{MousId, PipelineStateRecord, SplitStatus, Stage};

/// Confirms the split products landed and records them in the legacy table.
pub struct PostSplitOrganizeProcessor;

#[async_trait]
impl StageProcessor for PostSplitOrganizeProcessor {
    fn stage(&self) -> Stage {
        Stage::PostSplitOrganize
    }

    async fn process(
        &self,
        ctx: &StageContext,
        mous_id: &MousId,
        record: &PipelineStateRecord,
    ) -> AppResult<StageOutcome> {
        validate_post_split_organize(record)?;
        let products = &record.split_products_path;
        if products.is_empty() {
            return Err(AppError::ValidationError(format!("No split products recorded for {}", mous_id)));
        }
        ensure_paths_exist(&ctx.config, products)?;

        let notes = format!("verified {} split products", products.len());
        ctx.repo
            .mirror_split(mous_id, SplitStatus::Complete.as_str(), products, Some(&notes))
            .await?;
        info!("[{}] {}", mous_id, notes);

        Ok(StageOutcome::with_notes(notes))
    }
}
