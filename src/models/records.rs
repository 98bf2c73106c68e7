use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::status::{DownloadStatus, IN_PROGRESS, ListobsStatus, SelfcalStatus, SplitStatus, StatusColumn};
use crate::utils::date_utils::is_older_than;

/// Raw spectral window index -> corrected index, scoped to one unit.
pub type SpwRemap = BTreeMap<i32, i32>;

/// One row of `pipeline_state`.
///
/// Status fields are `None` when the stored value is NULL or not a label the
/// column recognises. Path lists are in the storage namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStateRecord {
    pub mous_id: String,

    pub download_status: Option<DownloadStatus>,
    pub download_url: Option<String>,
    pub download_started_at: Option<String>,
    pub download_completed_at: Option<String>,
    pub download_notes: Option<String>,
    pub mous_directory: Option<String>,
    pub calibrated_products: Vec<String>,

    pub pre_selfcal_split_status: Option<SplitStatus>,
    pub split_products_path: Vec<String>,
    pub split_started_at: Option<String>,
    pub split_completed_at: Option<String>,
    pub split_notes: Option<String>,

    pub pre_selfcal_listobs_status: Option<ListobsStatus>,
    pub listobs_started_at: Option<String>,
    pub listobs_completed_at: Option<String>,
    pub listobs_notes: Option<String>,

    pub selfcal_status: Option<SelfcalStatus>,
    pub selfcal_started_at: Option<String>,
    pub selfcal_completed_at: Option<String>,
    pub selfcal_notes: Option<String>,

    pub preferred_datacolumn: Option<String>,
    pub raw_data_spectral_remap: Option<String>,
}

impl PipelineStateRecord {
    /// A freshly imported unit: every stage pending.
    pub fn pending(mous_id: impl Into<String>) -> Self {
        Self {
            mous_id: mous_id.into(),
            download_status: Some(DownloadStatus::Pending),
            pre_selfcal_split_status: Some(SplitStatus::Pending),
            pre_selfcal_listobs_status: Some(ListobsStatus::Pending),
            selfcal_status: Some(SelfcalStatus::Pending),
            ..Default::default()
        }
    }

    /// Canonical label currently held by `column`, if any.
    pub fn status_label(&self, column: StatusColumn) -> Option<&'static str> {
        match column {
            StatusColumn::Download => self.download_status.map(|s| s.as_str()),
            StatusColumn::Split => self.pre_selfcal_split_status.map(|s| s.as_str()),
            StatusColumn::Listobs => self.pre_selfcal_listobs_status.map(|s| s.as_str()),
            StatusColumn::Selfcal => self.selfcal_status.map(|s| s.as_str()),
        }
    }

    pub fn started_at(&self, column: StatusColumn) -> Option<&str> {
        match column {
            StatusColumn::Download => self.download_started_at.as_deref(),
            StatusColumn::Split => self.split_started_at.as_deref(),
            StatusColumn::Listobs => self.listobs_started_at.as_deref(),
            StatusColumn::Selfcal => self.selfcal_started_at.as_deref(),
        }
    }

    /// Columns held `in_progress` by an attempt that started more than
    /// `threshold` before `now`. Attempts without a start time are never stale.
    pub fn stale_columns(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<StatusColumn> {
        StatusColumn::ALL
            .into_iter()
            .filter(|column| self.status_label(*column) == Some(IN_PROGRESS))
            .filter(|column| is_older_than(self.started_at(*column), threshold, now))
            .collect()
    }

    pub fn notes(&self, column: StatusColumn) -> Option<&str> {
        match column {
            StatusColumn::Download => self.download_notes.as_deref(),
            StatusColumn::Split => self.split_notes.as_deref(),
            StatusColumn::Listobs => self.listobs_notes.as_deref(),
            StatusColumn::Selfcal => self.selfcal_notes.as_deref(),
        }
    }
}

/// One row of the legacy `mous` table, kept in sync for older reporting tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MousRecord {
    pub mous_id: String,
    pub num_asdms: Option<i64>,
    pub asdm_paths: Vec<String>,
    pub download_url: Option<String>,
    pub downloaded: Option<String>,
    pub download_date: Option<String>,
    pub download_path: Option<String>,
    pub download_notes: Option<String>,
    pub split_status: Option<String>,
    pub split_products: Vec<String>,
    pub split_date: Option<String>,
    pub split_notes: Option<String>,
}

/// A science target observed within a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub mous_id: String,
    pub alma_source_name: String,
    pub obs_id: String,
    pub asdm_uid: Option<String>,
}

/// Import document entry for one unit, as produced by the catalog export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitImport {
    pub mous_id: String,
    #[serde(default)]
    pub num_asdms: Option<i64>,
    #[serde(default)]
    pub asdm_paths: Vec<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub preferred_datacolumn: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetImport {
    pub alma_source_name: String,
    pub obs_id: String,
    #[serde(default)]
    pub asdm_uid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record_labels() {
        let record = PipelineStateRecord::pending("uid://A/B/C");
        for column in StatusColumn::ALL {
            assert_eq!(record.status_label(column), Some("pending"));
            assert!(record.started_at(column).is_none());
        }
    }

    #[test]
    fn test_stale_columns_need_old_start_time() {
        let now = Utc::now();
        let old = crate::utils::date_utils::format_rfc3339(now - chrono::Duration::hours(3));
        let mut record = PipelineStateRecord::pending("uid://A/B/C");
        record.download_status = Some(DownloadStatus::InProgress);
        record.download_started_at = Some(old.clone());
        record.selfcal_status = Some(SelfcalStatus::InProgress);
        record.split_started_at = Some(old);

        assert_eq!(
            record.stale_columns(Duration::from_secs(3600), now),
            vec![StatusColumn::Download]
        );
        assert!(record.stale_columns(Duration::from_secs(4 * 3600), now).is_empty());
    }

    #[test]
    fn test_import_defaults() {
        let unit: UnitImport = serde_json::from_str(
            r#"{"mous_id":"uid://A001/X1/X2","targets":[{"alma_source_name":"IRAS4A","obs_id":"x.spw.16"}]}"#,
        )
        .unwrap();
        assert!(unit.download_url.is_none());
        assert_eq!(unit.targets.len(), 1);
        assert!(unit.targets[0].asdm_uid.is_none());
    }
}
