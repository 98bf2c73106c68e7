use log::{debug, info, warn};

use super::base::PipelineStateRepository;
use crate::error::{AppError, AppResult};
use crate::models::status::{ERROR, IN_PROGRESS, PENDING};
use crate::models::{MousId, Stage, StatusColumn};
use crate::utils::date_utils::now_rfc3339;

impl PipelineStateRepository {
    /// Atomically move `column` from `expected` to `in_progress`.
    ///
    /// The stored value is read, resolved through the column's alias table and
    /// compared with `expected`; the update is then conditional on the exact
    /// value that was read. On success the start time written for the attempt
    /// is returned: it identifies the attempt in [`Self::complete_stage`] and
    /// [`Self::fail_stage`]. Returns `None` when another writer got there first
    /// or the column no longer holds `expected`.
    pub async fn claim_status(
        &self,
        mous_id: &MousId,
        column: StatusColumn,
        expected: &str,
    ) -> AppResult<Option<String>> {
        let Some(raw) = self.get_raw_status(mous_id, column).await? else {
            debug!("[{}] {} is NULL, nothing to claim", mous_id, column);
            return Ok(None);
        };
        if column.canonical_label(&raw) != Some(expected) {
            debug!("[{}] {} is '{}', expected '{}'", mous_id, column, raw, expected);
            return Ok(None);
        }
        let started_at = now_rfc3339();

        let query = format!(
            "UPDATE pipeline_state SET {status} = $1, {started} = $2, {completed} = NULL, {notes} = NULL \
             WHERE mous_id = $3 AND {status} = $4",
            status = column.status_column(),
            started = column.started_at_column(),
            completed = column.completed_at_column(),
            notes = column.notes_column(),
        );
        let result = sqlx::query(&query)
            .bind(IN_PROGRESS)
            .bind(&started_at)
            .bind(mous_id.database_form())
            .bind(&raw)
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to claim {}: {}", column, e)))?;

        if result.rows_affected() != 1 {
            debug!("[{}] Lost the race claiming {}", mous_id, column);
            return Ok(None);
        }
        info!("[{}] {} -> {} (attempt {})", mous_id, column, IN_PROGRESS, started_at);
        Ok(Some(started_at))
    }

    /// Claim the status column of `stage` (its pre-condition value -> `in_progress`).
    pub async fn claim_stage(&self, mous_id: &MousId, stage: Stage) -> AppResult<Option<String>> {
        self.claim_status(mous_id, stage.column(), stage.claim_from()).await
    }

    /// Write the terminal `label` for the attempt identified by `claim`.
    ///
    /// Returns `false`, leaving the row untouched, when that attempt is no
    /// longer the live one: it was expired, requeued or re-claimed meanwhile.
    async fn finish_attempt(
        &self,
        mous_id: &MousId,
        column: StatusColumn,
        claim: &str,
        label: &str,
        notes: Option<&str>,
    ) -> AppResult<bool> {
        let query = format!(
            "UPDATE pipeline_state SET {status} = $1, {completed} = $2, {notes} = $3 \
             WHERE mous_id = $4 AND {status} = $5 AND {started} = $6",
            status = column.status_column(),
            completed = column.completed_at_column(),
            notes = column.notes_column(),
            started = column.started_at_column(),
        );
        let result = sqlx::query(&query)
            .bind(label)
            .bind(now_rfc3339())
            .bind(notes)
            .bind(mous_id.database_form())
            .bind(IN_PROGRESS)
            .bind(claim)
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to mark {} as {}: {}", column, label, e)))?;

        if result.rows_affected() == 0 {
            warn!(
                "[{}] Attempt {} on {} is no longer in progress; dropping its '{}' result",
                mous_id, claim, column, label
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Write the success label of `stage` for the attempt identified by `claim`.
    pub async fn complete_stage(
        &self,
        mous_id: &MousId,
        stage: Stage,
        claim: &str,
        notes: Option<&str>,
    ) -> AppResult<bool> {
        let completed = self
            .finish_attempt(mous_id, stage.column(), claim, stage.success_label(), notes)
            .await?;
        if completed {
            info!("[{}] {} -> {}", mous_id, stage.column(), stage.success_label());
        }
        Ok(completed)
    }

    /// Set `column` to `error` with `notes` for the attempt identified by `claim`.
    pub async fn fail_status(
        &self,
        mous_id: &MousId,
        column: StatusColumn,
        claim: &str,
        notes: &str,
    ) -> AppResult<bool> {
        let failed = self.finish_attempt(mous_id, column, claim, ERROR, Some(notes)).await?;
        if failed {
            warn!("[{}] {} -> {}: {}", mous_id, column, ERROR, notes);
        }
        Ok(failed)
    }

    pub async fn fail_stage(&self, mous_id: &MousId, stage: Stage, claim: &str, notes: &str) -> AppResult<bool> {
        self.fail_status(mous_id, stage.column(), claim, notes).await
    }

    /// Manually put an errored column back into the pipeline.
    ///
    /// `to` defaults to `pending`; any other label must be valid for the column.
    /// Only a column currently at `error` is touched.
    pub async fn requeue(&self, mous_id: &MousId, column: StatusColumn, to: Option<&str>) -> AppResult<bool> {
        let target = match to {
            Some(label) => column.canonical_label(label).ok_or_else(|| {
                AppError::ValidationError(format!("'{}' is not a valid value for {}", label, column))
            })?,
            None => PENDING,
        };
        if target == IN_PROGRESS || target == ERROR {
            return Err(AppError::ValidationError(format!("Cannot requeue {} to '{}'", column, target)));
        }

        let Some(raw) = self.get_raw_status(mous_id, column).await? else {
            return Ok(false);
        };
        if column.canonical_label(&raw) != Some(ERROR) {
            info!("[{}] {} is '{}', only errored stages are requeued", mous_id, column, raw);
            return Ok(false);
        }

        let query = format!(
            "UPDATE pipeline_state SET {status} = $1, {started} = NULL, {completed} = NULL, {notes} = $2 \
             WHERE mous_id = $3 AND {status} = $4",
            status = column.status_column(),
            started = column.started_at_column(),
            completed = column.completed_at_column(),
            notes = column.notes_column(),
        );
        let result = sqlx::query(&query)
            .bind(target)
            .bind(format!("requeued at {}", now_rfc3339()))
            .bind(mous_id.database_form())
            .bind(&raw)
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to requeue {}: {}", column, e)))?;

        let requeued = result.rows_affected() == 1;
        if requeued {
            info!("[{}] {} requeued -> {}", mous_id, column, target);
        }
        Ok(requeued)
    }
}
