use std::collections::BTreeMap;

use super::base::PipelineStateRepository;
use super::helpers::{PIPELINE_STATE_COLUMNS, row_to_mous, row_to_record, row_to_target};
use crate::error::{AppError, AppResult};
use crate::models::{MousId, MousRecord, PipelineStateRecord, StatusColumn, TargetRecord};

/// Label used in status counts for a NULL status value.
pub const MISSING_LABEL: &str = "missing";

impl PipelineStateRepository {
    /// Fetch one unit's state row.
    pub async fn find_record(&self, mous_id: &MousId) -> AppResult<Option<PipelineStateRecord>> {
        let query = format!("SELECT {} FROM pipeline_state WHERE mous_id = $1", PIPELINE_STATE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(mous_id.database_form())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch pipeline state: {}", e)))?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Fetch one unit's state row, failing with `NotFoundError` if absent.
    pub async fn get_record(&self, mous_id: &MousId) -> AppResult<PipelineStateRecord> {
        self.find_record(mous_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("MOUS {} not found in pipeline_state", mous_id)))
    }

    /// Snapshot of every unit, ordered by ID.
    pub async fn list_records(&self) -> AppResult<Vec<PipelineStateRecord>> {
        let query = format!("SELECT {} FROM pipeline_state ORDER BY mous_id", PIPELINE_STATE_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list pipeline state: {}", e)))?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn get_targets(&self, mous_id: &MousId) -> AppResult<Vec<TargetRecord>> {
        let rows = sqlx::query(
            "SELECT mous_id, alma_source_name, obs_id, asdm_uid FROM targets WHERE mous_id = $1 ORDER BY id",
        )
        .bind(mous_id.database_form())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch targets: {}", e)))?;

        rows.iter().map(row_to_target).collect()
    }

    pub async fn get_mous_record(&self, mous_id: &MousId) -> AppResult<MousRecord> {
        let row = sqlx::query("SELECT * FROM mous WHERE mous_id = $1")
            .bind(mous_id.database_form())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch mous record: {}", e)))?
            .ok_or_else(|| AppError::NotFoundError(format!("MOUS {} not found in mous", mous_id)))?;

        row_to_mous(&row)
    }

    /// Raw stored value of a status column, without alias resolution.
    pub async fn get_raw_status(&self, mous_id: &MousId, column: StatusColumn) -> AppResult<Option<String>> {
        let query = format!("SELECT {} FROM pipeline_state WHERE mous_id = $1", column.status_column());
        let value: Option<Option<String>> = sqlx::query_scalar(&query)
            .bind(mous_id.database_form())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read {}: {}", column, e)))?;

        value.ok_or_else(|| AppError::NotFoundError(format!("MOUS {} not found in pipeline_state", mous_id)))
    }

    /// Number of units per stored value, for every status column.
    pub async fn status_counts(&self) -> AppResult<Vec<(StatusColumn, BTreeMap<String, i64>)>> {
        let mut counts = Vec::with_capacity(StatusColumn::ALL.len());

        for column in StatusColumn::ALL {
            let query = format!(
                "SELECT {0} AS label, COUNT(*) AS n FROM pipeline_state GROUP BY {0}",
                column.status_column()
            );
            let rows: Vec<(Option<String>, i64)> = sqlx::query_as(&query)
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to count {}: {}", column, e)))?;

            let mut per_label = BTreeMap::new();
            for (label, n) in rows {
                let key = match label {
                    Some(raw) => column.canonical_label(&raw).map_or(raw, str::to_string),
                    None => MISSING_LABEL.to_string(),
                };
                *per_label.entry(key).or_insert(0) += n;
            }
            counts.push((column, per_label));
        }

        Ok(counts)
    }
}
