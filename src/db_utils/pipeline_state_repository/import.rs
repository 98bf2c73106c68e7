use log::{debug, info};

use super::base::PipelineStateRepository;
use super::helpers::encode_path_list;
use crate::error::{AppError, AppResult};
use crate::models::status::PENDING;
use crate::models::{MousId, UnitImport};

impl PipelineStateRepository {
    /// Register units and their targets from a catalog import, in one transaction.
    ///
    /// New units start with every stage `pending`. Units already present are
    /// left untouched, targets included, so re-running an import is harmless.
    /// Returns the number of units created.
    pub async fn register_units(&self, units: &[UnitImport]) -> AppResult<usize> {
        let ids = units
            .iter()
            .map(|unit| MousId::parse(&unit.mous_id))
            .collect::<AppResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        let mut created = 0;

        for (unit, id) in units.iter().zip(&ids) {
            let db_id = id.database_form();

            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO mous (mous_id, num_asdms, asdm_paths, download_url) VALUES ($1, $2, $3, $4)",
            )
            .bind(&db_id)
            .bind(unit.num_asdms)
            .bind(encode_path_list(&unit.asdm_paths)?)
            .bind(&unit.download_url)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert mous {}: {}", db_id, e)))?
            .rows_affected();

            if inserted == 0 {
                debug!("[{}] Already registered, skipping", db_id);
                continue;
            }

            sqlx::query(
                "INSERT INTO pipeline_state (mous_id, download_status, download_url, pre_selfcal_split_status, \
                 pre_selfcal_listobs_status, selfcal_status, preferred_datacolumn) \
                 VALUES ($1, $2, $3, $2, $2, $2, $4)",
            )
            .bind(&db_id)
            .bind(PENDING)
            .bind(&unit.download_url)
            .bind(&unit.preferred_datacolumn)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert pipeline state {}: {}", db_id, e)))?;

            for target in &unit.targets {
                sqlx::query(
                    "INSERT INTO targets (mous_id, alma_source_name, obs_id, asdm_uid) VALUES ($1, $2, $3, $4)",
                )
                .bind(&db_id)
                .bind(&target.alma_source_name)
                .bind(&target.obs_id)
                .bind(&target.asdm_uid)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert target for {}: {}", db_id, e)))?;
            }

            created += 1;
        }

        tx.commit().await?;
        info!("Registered {} new units ({} in import)", created, units.len());
        Ok(created)
    }

    /// Register a single unit. See [`register_units`](Self::register_units).
    pub async fn register_unit(&self, unit: &UnitImport) -> AppResult<bool> {
        Ok(self.register_units(std::slice::from_ref(unit)).await? == 1)
    }
}
