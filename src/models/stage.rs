use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::status::{
    DownloadStatus, ListobsStatus, SelfcalStatus, SplitStatus, StatusColumn,
};

/// One step of the pipeline. Declaration order is dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    PostDownloadOrganize,
    Split,
    PostSplitOrganize,
    Listobs,
    SelfcalPrep,
    Selfcal,
    PostSelfcalCleanup,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Download,
        Stage::PostDownloadOrganize,
        Stage::Split,
        Stage::PostSplitOrganize,
        Stage::Listobs,
        Stage::SelfcalPrep,
        Stage::Selfcal,
        Stage::PostSelfcalCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::PostDownloadOrganize => "post_download_organize",
            Stage::Split => "split",
            Stage::PostSplitOrganize => "post_split_organize",
            Stage::Listobs => "listobs",
            Stage::SelfcalPrep => "selfcal_prep",
            Stage::Selfcal => "selfcal",
            Stage::PostSelfcalCleanup => "post_selfcal_cleanup",
        }
    }

    /// Status column this stage claims and writes.
    pub fn column(&self) -> StatusColumn {
        match self {
            Stage::Download | Stage::PostDownloadOrganize => StatusColumn::Download,
            Stage::Split | Stage::PostSplitOrganize => StatusColumn::Split,
            Stage::Listobs => StatusColumn::Listobs,
            Stage::SelfcalPrep | Stage::Selfcal | Stage::PostSelfcalCleanup => StatusColumn::Selfcal,
        }
    }

    /// Value the column must hold for the stage to claim it.
    pub fn claim_from(&self) -> &'static str {
        match self {
            Stage::Download => DownloadStatus::Pending.as_str(),
            Stage::PostDownloadOrganize => DownloadStatus::Downloaded.as_str(),
            Stage::Split => SplitStatus::Pending.as_str(),
            Stage::PostSplitOrganize => SplitStatus::Split.as_str(),
            Stage::Listobs => ListobsStatus::Pending.as_str(),
            Stage::SelfcalPrep => SelfcalStatus::Pending.as_str(),
            Stage::Selfcal => SelfcalStatus::Prepped.as_str(),
            Stage::PostSelfcalCleanup => SelfcalStatus::Selfcaled.as_str(),
        }
    }

    /// Value written to the column when the stage succeeds.
    pub fn success_label(&self) -> &'static str {
        match self {
            Stage::Download => DownloadStatus::Downloaded.as_str(),
            Stage::PostDownloadOrganize => DownloadStatus::Complete.as_str(),
            Stage::Split => SplitStatus::Split.as_str(),
            Stage::PostSplitOrganize => SplitStatus::Complete.as_str(),
            Stage::Listobs => ListobsStatus::Complete.as_str(),
            Stage::SelfcalPrep => SelfcalStatus::Prepped.as_str(),
            Stage::Selfcal => SelfcalStatus::Selfcaled.as_str(),
            Stage::PostSelfcalCleanup => SelfcalStatus::Complete.as_str(),
        }
    }

    /// Stages that delete or overwrite data on disk and need confirmation
    /// before a manual run.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Stage::PostSelfcalCleanup)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| AppError::ValidationError(format!("Unknown stage: {}", s)))
    }
}
