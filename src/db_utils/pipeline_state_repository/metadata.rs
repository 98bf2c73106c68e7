use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::base::PipelineStateRepository;
use super::helpers::encode_path_list;
use crate::error::{AppError, AppResult};
use crate::models::{MousId, SpwRemap, TargetRecord};
use crate::utils::date_utils::now_rfc3339;

static SPW_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.spw\.(\d+)$").expect("spw suffix regex pattern should be valid"));

/// Decode a stored remap such as `{"16":"0","18":1}`.
///
/// Keys must be integers; values may be integers or integer strings.
pub fn parse_spw_remap(raw: &str) -> AppResult<SpwRemap> {
    let object: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|e| AppError::MalformedRemap(format!("{}: {}", raw, e)))?;

    let mut remap = SpwRemap::new();
    for (key, value) in object {
        let from = key
            .trim()
            .parse::<i32>()
            .map_err(|_| AppError::MalformedRemap(format!("key '{}' is not an integer", key)))?;
        let to = match &value {
            Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
            Value::String(s) => s.trim().parse::<i32>().ok(),
            _ => None,
        }
        .ok_or_else(|| AppError::MalformedRemap(format!("value {} for key '{}' is not an integer", value, key)))?;
        remap.insert(from, to);
    }
    Ok(remap)
}

/// Spectral window sets per source derived from target observation IDs.
///
/// Observation IDs ending in `.spw.<N>` contribute `N`, replaced by its
/// remapped value when the remap has an entry for it. Other targets are skipped.
pub fn compute_spw_mapping(targets: &[TargetRecord], remap: Option<&SpwRemap>) -> BTreeMap<String, BTreeSet<i32>> {
    let mut mapping: BTreeMap<String, BTreeSet<i32>> = BTreeMap::new();
    for target in targets {
        let Some(captures) = SPW_SUFFIX.captures(&target.obs_id) else {
            continue;
        };
        let Ok(raw_spw) = captures[1].parse::<i32>() else {
            continue;
        };
        let spw = remap.and_then(|r| r.get(&raw_spw)).copied().unwrap_or(raw_spw);
        mapping.entry(target.alma_source_name.clone()).or_default().insert(spw);
    }

    mapping
}

impl PipelineStateRepository {
    /// The unit's stored spectral window remap, or `None` when unset.
    pub async fn get_spw_remap(&self, mous_id: &MousId) -> AppResult<Option<SpwRemap>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT raw_data_spectral_remap FROM pipeline_state WHERE mous_id = $1")
                .bind(mous_id.database_form())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to read spw remap: {}", e)))?;

        let raw = value.ok_or_else(|| AppError::NotFoundError(format!("MOUS {} not found in pipeline_state", mous_id)))?;
        match raw {
            Some(raw) if !raw.trim().is_empty() => parse_spw_remap(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Replace the unit's remap. An empty map clears it.
    pub async fn set_spw_remap(&self, mous_id: &MousId, remap: &SpwRemap) -> AppResult<()> {
        let payload = if remap.is_empty() {
            None
        } else {
            let keyed: BTreeMap<String, i32> = remap.iter().map(|(k, v)| (k.to_string(), *v)).collect();
            Some(serde_json::to_string(&keyed)?)
        };

        let result = sqlx::query("UPDATE pipeline_state SET raw_data_spectral_remap = $1 WHERE mous_id = $2")
            .bind(payload)
            .bind(mous_id.database_form())
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to store spw remap: {}", e)))?;

        ensure_updated(result.rows_affected(), mous_id)?;
        info!("[{}] SPW remap updated: {:?}", mous_id, remap);
        Ok(())
    }

    /// Per-source spectral windows for the split stage, with the remap applied.
    pub async fn get_spw_mapping(&self, mous_id: &MousId) -> AppResult<BTreeMap<String, BTreeSet<i32>>> {
        let targets = self.get_targets(mous_id).await?;
        let remap = self.get_spw_remap(mous_id).await?;
        let mapping = compute_spw_mapping(&targets, remap.as_ref());
        debug!("[{}] SPW mapping: {:?}", mous_id, mapping);
        Ok(mapping)
    }

    pub async fn set_download_url(&self, mous_id: &MousId, url: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE pipeline_state SET download_url = $1 WHERE mous_id = $2")
            .bind(url)
            .bind(mous_id.database_form())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to set download url: {}", e)))?;
        ensure_updated(result.rows_affected(), mous_id)?;

        sqlx::query("UPDATE mous SET download_url = $1 WHERE mous_id = $2")
            .bind(url)
            .bind(mous_id.database_form())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to set download url: {}", e)))?;

        tx.commit().await?;
        info!("[{}] Download URL set", mous_id);
        Ok(())
    }

    pub async fn set_mous_directory(&self, mous_id: &MousId, directory: &str) -> AppResult<()> {
        self.update_text_column(mous_id, "mous_directory", Some(directory.to_string())).await
    }

    pub async fn set_calibrated_products(&self, mous_id: &MousId, products: &[String]) -> AppResult<()> {
        self.update_text_column(mous_id, "calibrated_products", Some(encode_path_list(products)?))
            .await
    }

    pub async fn set_split_products(&self, mous_id: &MousId, products: &[String]) -> AppResult<()> {
        self.update_text_column(mous_id, "split_products_path", Some(encode_path_list(products)?))
            .await
    }

    pub async fn set_preferred_datacolumn(&self, mous_id: &MousId, datacolumn: Option<&str>) -> AppResult<()> {
        self.update_text_column(mous_id, "preferred_datacolumn", datacolumn.map(str::to_string))
            .await
    }

    async fn update_text_column(&self, mous_id: &MousId, column: &'static str, value: Option<String>) -> AppResult<()> {
        let query = format!("UPDATE pipeline_state SET {} = $1 WHERE mous_id = $2", column);
        let result = sqlx::query(&query)
            .bind(value)
            .bind(mous_id.database_form())
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update {}: {}", column, e)))?;

        ensure_updated(result.rows_affected(), mous_id)
    }

    /// Mirror a download outcome into the legacy `mous` table.
    pub async fn mirror_download(
        &self,
        mous_id: &MousId,
        downloaded: &str,
        download_path: Option<&str>,
        notes: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE mous SET downloaded = $1, download_date = $2, download_path = COALESCE($3, download_path), \
             download_notes = $4 WHERE mous_id = $5",
        )
        .bind(downloaded)
        .bind(now_rfc3339())
        .bind(download_path)
        .bind(notes)
        .bind(mous_id.database_form())
        .execute(&*self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update mous download fields: {}", e)))?;
        Ok(())
    }

    /// Mirror a split outcome into the legacy `mous` table.
    pub async fn mirror_split(
        &self,
        mous_id: &MousId,
        split_status: &str,
        products: &[String],
        notes: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE mous SET split_status = $1, split_products = $2, split_date = $3, split_notes = $4 \
             WHERE mous_id = $5",
        )
        .bind(split_status)
        .bind(encode_path_list(products)?)
        .bind(now_rfc3339())
        .bind(notes)
        .bind(mous_id.database_form())
        .execute(&*self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update mous split fields: {}", e)))?;
        Ok(())
    }
}

fn ensure_updated(rows_affected: u64, mous_id: &MousId) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(AppError::NotFoundError(format!("MOUS {} not found in pipeline_state", mous_id)));
    }
    Ok(())
}
