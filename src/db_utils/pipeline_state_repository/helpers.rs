use log::warn;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::AppResult;
use crate::models::{
    DownloadStatus, ListobsStatus, MousRecord, PipelineStateRecord, SelfcalStatus, SplitStatus,
    TargetRecord,
};

pub(super) const PIPELINE_STATE_COLUMNS: &str = "mous_id, download_status, download_url, \
    download_started_at, download_completed_at, download_notes, mous_directory, calibrated_products, \
    pre_selfcal_split_status, split_products_path, split_started_at, split_completed_at, split_notes, \
    pre_selfcal_listobs_status, listobs_started_at, listobs_completed_at, listobs_notes, \
    selfcal_status, selfcal_started_at, selfcal_completed_at, selfcal_notes, \
    preferred_datacolumn, raw_data_spectral_remap";

fn opt_string(row: &SqliteRow, column: &str) -> AppResult<Option<String>> {
    Ok(row.try_get::<'_, Option<String>, _>(column)?)
}

/// Read a status column through its enum. NULL and unrecognised values both
/// come back as `None`; the latter is logged so bad data is visible.
fn status<T>(
    row: &SqliteRow,
    mous_id: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> AppResult<Option<T>> {
    let Some(raw) = opt_string(row, column)? else {
        return Ok(None);
    };
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!("[{}] Unrecognised {} value '{}', treating as missing", mous_id, column, raw);
    }
    Ok(parsed)
}

/// Decode a JSON array of paths. A malformed value is logged and read as empty.
pub(super) fn parse_path_list(mous_id: &str, column: &str, raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("[{}] Could not parse {} as a JSON list: {}", mous_id, column, e);
            Vec::new()
        }
    }
}

pub(super) fn encode_path_list(paths: &[String]) -> AppResult<String> {
    Ok(serde_json::to_string(paths)?)
}

pub(super) fn row_to_record(row: &SqliteRow) -> AppResult<PipelineStateRecord> {
    let mous_id: String = row.try_get("mous_id")?;

    Ok(PipelineStateRecord {
        download_status: status(row, &mous_id, "download_status", DownloadStatus::from_stored)?,
        download_url: opt_string(row, "download_url")?,
        download_started_at: opt_string(row, "download_started_at")?,
        download_completed_at: opt_string(row, "download_completed_at")?,
        download_notes: opt_string(row, "download_notes")?,
        mous_directory: opt_string(row, "mous_directory")?,
        calibrated_products: parse_path_list(
            &mous_id,
            "calibrated_products",
            opt_string(row, "calibrated_products")?,
        ),
        pre_selfcal_split_status: status(row, &mous_id, "pre_selfcal_split_status", SplitStatus::from_stored)?,
        split_products_path: parse_path_list(
            &mous_id,
            "split_products_path",
            opt_string(row, "split_products_path")?,
        ),
        split_started_at: opt_string(row, "split_started_at")?,
        split_completed_at: opt_string(row, "split_completed_at")?,
        split_notes: opt_string(row, "split_notes")?,
        pre_selfcal_listobs_status: status(
            row,
            &mous_id,
            "pre_selfcal_listobs_status",
            ListobsStatus::from_stored,
        )?,
        listobs_started_at: opt_string(row, "listobs_started_at")?,
        listobs_completed_at: opt_string(row, "listobs_completed_at")?,
        listobs_notes: opt_string(row, "listobs_notes")?,
        selfcal_status: status(row, &mous_id, "selfcal_status", SelfcalStatus::from_stored)?,
        selfcal_started_at: opt_string(row, "selfcal_started_at")?,
        selfcal_completed_at: opt_string(row, "selfcal_completed_at")?,
        selfcal_notes: opt_string(row, "selfcal_notes")?,
        preferred_datacolumn: opt_string(row, "preferred_datacolumn")?,
        raw_data_spectral_remap: opt_string(row, "raw_data_spectral_remap")?,
        mous_id,
    })
}

pub(super) fn row_to_mous(row: &SqliteRow) -> AppResult<MousRecord> {
    let mous_id: String = row.try_get("mous_id")?;

    Ok(MousRecord {
        num_asdms: row.try_get::<'_, Option<i64>, _>("num_asdms")?,
        asdm_paths: parse_path_list(&mous_id, "asdm_paths", opt_string(row, "asdm_paths")?),
        download_url: opt_string(row, "download_url")?,
        downloaded: opt_string(row, "downloaded")?,
        download_date: opt_string(row, "download_date")?,
        download_path: opt_string(row, "download_path")?,
        download_notes: opt_string(row, "download_notes")?,
        split_status: opt_string(row, "split_status")?,
        split_products: parse_path_list(&mous_id, "split_products", opt_string(row, "split_products")?),
        split_date: opt_string(row, "split_date")?,
        split_notes: opt_string(row, "split_notes")?,
        mous_id,
    })
}

pub(super) fn row_to_target(row: &SqliteRow) -> AppResult<TargetRecord> {
    Ok(TargetRecord {
        mous_id: row.try_get("mous_id")?,
        alma_source_name: row.try_get("alma_source_name")?,
        obs_id: row.try_get("obs_id")?,
        asdm_uid: opt_string(row, "asdm_uid")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_list_parsing_is_lenient() {
        assert_eq!(
            parse_path_list("u", "c", Some(r#"["/a.ms","/b.ms"]"#.to_string())),
            vec!["/a.ms".to_string(), "/b.ms".to_string()]
        );
        assert!(parse_path_list("u", "c", Some("not json".to_string())).is_empty());
        assert!(parse_path_list("u", "c", Some("  ".to_string())).is_empty());
        assert!(parse_path_list("u", "c", None).is_empty());
    }
}
