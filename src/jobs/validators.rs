//! Eligibility checks, one per stage.
//!
//! Validators only read the record they are given. A rejection is an
//! `AppError::PreconditionFailed` naming the first unmet field; the dispatcher
//! treats it as "not yet" rather than as a failure.

use crate::error::{AppError, AppResult};
use crate::models::{DownloadStatus, ListobsStatus, PipelineStateRecord, SelfcalStatus, SplitStatus, Stage};

/// Product lists consumed by the listobs stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListobsInputs {
    pub calibrated_products: Vec<String>,
    pub split_products: Vec<String>,
}

fn require_status(field: &str, actual: Option<&'static str>, expected: &[&'static str]) -> AppResult<()> {
    match actual {
        Some(label) if expected.contains(&label) => Ok(()),
        Some(label) => Err(AppError::precondition(
            field,
            format!("expected {}, found '{}'", describe(expected), label),
        )),
        None => Err(AppError::precondition(
            field,
            format!("expected {}, found missing", describe(expected)),
        )),
    }
}

fn describe(expected: &[&'static str]) -> String {
    expected
        .iter()
        .map(|label| format!("'{}'", label))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn require_text<'a>(field: &str, value: Option<&'a str>) -> AppResult<&'a str> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(AppError::precondition(field, "must be non-empty")),
    }
}

/// `download_status == pending` and a download URL is set. Returns the URL.
pub fn validate_download(record: &PipelineStateRecord) -> AppResult<String> {
    require_status(
        "download_status",
        record.download_status.map(|s| s.as_str()),
        &[DownloadStatus::Pending.as_str()],
    )?;
    let url = require_text("download_url", record.download_url.as_deref())?;
    Ok(url.to_string())
}

/// `download_status == downloaded` with a recorded staging directory. Returns it.
pub fn validate_post_download_organize(record: &PipelineStateRecord) -> AppResult<String> {
    require_status(
        "download_status",
        record.download_status.map(|s| s.as_str()),
        &[DownloadStatus::Downloaded.as_str()],
    )?;
    let staging = require_text("mous_directory", record.mous_directory.as_deref())?;
    Ok(staging.to_string())
}

/// Download organized and split not yet attempted. Returns the calibrated products.
pub fn validate_split(record: &PipelineStateRecord) -> AppResult<Vec<String>> {
    require_status(
        "download_status",
        record.download_status.map(|s| s.as_str()),
        &[DownloadStatus::Complete.as_str()],
    )?;
    require_status(
        "pre_selfcal_split_status",
        record.pre_selfcal_split_status.map(|s| s.as_str()),
        &[SplitStatus::Pending.as_str()],
    )?;
    Ok(record.calibrated_products.clone())
}

pub fn validate_post_split_organize(record: &PipelineStateRecord) -> AppResult<()> {
    require_status(
        "pre_selfcal_split_status",
        record.pre_selfcal_split_status.map(|s| s.as_str()),
        &[SplitStatus::Split.as_str()],
    )
}

/// Split products exist (organized or not) and listobs is pending.
pub fn validate_listobs(record: &PipelineStateRecord) -> AppResult<ListobsInputs> {
    require_status(
        "pre_selfcal_split_status",
        record.pre_selfcal_split_status.map(|s| s.as_str()),
        &[SplitStatus::Complete.as_str(), SplitStatus::Split.as_str()],
    )?;
    require_status(
        "pre_selfcal_listobs_status",
        record.pre_selfcal_listobs_status.map(|s| s.as_str()),
        &[ListobsStatus::Pending.as_str()],
    )?;
    Ok(ListobsInputs {
        calibrated_products: record.calibrated_products.clone(),
        split_products: record.split_products_path.clone(),
    })
}

/// Listobs done and self-calibration pending. Returns the unit directory.
pub fn validate_selfcal_prep(record: &PipelineStateRecord) -> AppResult<String> {
    require_status(
        "pre_selfcal_listobs_status",
        record.pre_selfcal_listobs_status.map(|s| s.as_str()),
        &[ListobsStatus::Complete.as_str()],
    )?;
    require_status(
        "selfcal_status",
        record.selfcal_status.map(|s| s.as_str()),
        &[SelfcalStatus::Pending.as_str()],
    )?;
    let mous_dir = require_text("mous_directory", record.mous_directory.as_deref())?;
    Ok(mous_dir.to_string())
}

pub fn validate_selfcal(record: &PipelineStateRecord) -> AppResult<()> {
    require_status(
        "selfcal_status",
        record.selfcal_status.map(|s| s.as_str()),
        &[SelfcalStatus::Prepped.as_str()],
    )
}

pub fn validate_post_selfcal_cleanup(record: &PipelineStateRecord) -> AppResult<()> {
    require_status(
        "selfcal_status",
        record.selfcal_status.map(|s| s.as_str()),
        &[SelfcalStatus::Selfcaled.as_str()],
    )
}

/// Run the validator for `stage`, discarding what it returns.
pub fn check_stage(stage: Stage, record: &PipelineStateRecord) -> AppResult<()> {
    match stage {
        Stage::Download => validate_download(record).map(|_| ()),
        Stage::PostDownloadOrganize => validate_post_download_organize(record).map(|_| ()),
        Stage::Split => validate_split(record).map(|_| ()),
        Stage::PostSplitOrganize => validate_post_split_organize(record),
        Stage::Listobs => validate_listobs(record).map(|_| ()),
        Stage::SelfcalPrep => validate_selfcal_prep(record).map(|_| ()),
        Stage::Selfcal => validate_selfcal(record),
        Stage::PostSelfcalCleanup => validate_post_selfcal_cleanup(record),
    }
}

/// Stages `record` is currently eligible for, in pipeline order.
pub fn eligible_stages(record: &PipelineStateRecord) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| check_stage(*stage, record).is_ok())
        .collect()
}
