use chrono::Utc;
use log::warn;
use std::time::Duration;

use super::base::PipelineStateRepository;
use crate::error::{AppError, AppResult};
use crate::models::status::{ERROR, IN_PROGRESS};
use crate::models::{MousId, PipelineStateRecord, StatusColumn};
use crate::utils::date_utils::now_rfc3339;

/// An attempt left `in_progress` past the staleness threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleAttempt {
    pub mous_id: String,
    pub column: StatusColumn,
    pub started_at: String,
}

/// Every stale attempt in `records`.
pub fn find_stale_attempts(records: &[PipelineStateRecord], threshold: Duration) -> Vec<StaleAttempt> {
    let now = Utc::now();
    records
        .iter()
        .flat_map(|record| {
            record
                .stale_columns(threshold, now)
                .into_iter()
                .filter_map(move |column| {
                    record.started_at(column).map(|started_at| StaleAttempt {
                        mous_id: record.mous_id.clone(),
                        column,
                        started_at: started_at.to_string(),
                    })
                })
        })
        .collect()
}

impl PipelineStateRepository {
    /// Move one stale attempt to `error`.
    ///
    /// Conditional on the column still being `in_progress` with the same start
    /// time, so an attempt that finished or was re-claimed meanwhile is left alone.
    pub async fn expire_attempt(&self, attempt: &StaleAttempt, threshold: Duration) -> AppResult<bool> {
        let column = attempt.column;
        let notes = format!(
            "expired: in_progress since {} exceeded {}s staleness threshold",
            attempt.started_at,
            threshold.as_secs()
        );
        let query = format!(
            "UPDATE pipeline_state SET {status} = $1, {completed} = $2, {notes} = $3 \
             WHERE mous_id = $4 AND {status} = $5 AND {started} = $6",
            status = column.status_column(),
            completed = column.completed_at_column(),
            notes = column.notes_column(),
            started = column.started_at_column(),
        );
        let result = sqlx::query(&query)
            .bind(ERROR)
            .bind(now_rfc3339())
            .bind(&notes)
            .bind(&attempt.mous_id)
            .bind(IN_PROGRESS)
            .bind(&attempt.started_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to expire {}: {}", column, e)))?;

        let expired = result.rows_affected() == 1;
        if expired {
            warn!("[{}] {} {}", attempt.mous_id, column, notes);
        }
        Ok(expired)
    }

    /// Scan every unit and expire attempts stuck past `threshold`.
    pub async fn expire_stale(&self, threshold: Duration) -> AppResult<Vec<StaleAttempt>> {
        let records = self.list_records().await?;
        let mut expired = Vec::new();
        for attempt in find_stale_attempts(&records, threshold) {
            if self.expire_attempt(&attempt, threshold).await? {
                expired.push(attempt);
            }
        }
        Ok(expired)
    }

    /// Overwrite the start time of an attempt.
    pub async fn set_started_at(&self, mous_id: &MousId, column: StatusColumn, started_at: &str) -> AppResult<()> {
        let query = format!(
            "UPDATE pipeline_state SET {} = $1 WHERE mous_id = $2",
            column.started_at_column()
        );
        sqlx::query(&query)
            .bind(started_at)
            .bind(mous_id.database_form())
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to set start time: {}", e)))?;
        Ok(())
    }
}
