use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub const PENDING: &str = "pending";
pub const IN_PROGRESS: &str = "in_progress";
pub const ERROR: &str = "error";

/// Generates a closed status enum for one status column.
///
/// Each variant has one canonical label (what gets written) and optional
/// legacy aliases accepted when reading rows written by older tooling.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Lenient read of a persisted value. Canonical labels and legacy
            /// aliases are accepted case-insensitively; anything else is `None`.
            pub fn from_stored(raw: &str) -> Option<Self> {
                match raw.trim().to_lowercase().as_str() {
                    $($label $(| $alias)* => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_stored(s).ok_or_else(|| {
                    AppError::ValidationError(format!("Invalid {}: {}", stringify!($name), s))
                })
            }
        }
    };
}

status_enum! {
    /// `download_status`
    DownloadStatus {
        Pending => "pending",
        InProgress => "in_progress" | "running" | "downloading",
        Downloaded => "downloaded",
        Complete => "complete" | "completed" | "done" | "organized",
        Error => "error" | "failed",
    }
}

status_enum! {
    /// `pre_selfcal_split_status`
    SplitStatus {
        Pending => "pending",
        InProgress => "in_progress" | "running" | "splitting",
        Split => "split",
        Complete => "complete" | "completed" | "done",
        Error => "error" | "failed",
    }
}

status_enum! {
    /// `pre_selfcal_listobs_status`
    ListobsStatus {
        Pending => "pending",
        InProgress => "in_progress" | "running",
        Complete => "complete" | "completed" | "done",
        Error => "error" | "failed",
    }
}

status_enum! {
    /// `selfcal_status`
    SelfcalStatus {
        Pending => "pending",
        InProgress => "in_progress" | "running",
        Prepped => "prepped" | "prepared",
        Selfcaled => "selfcaled" | "selfcalibrated",
        Complete => "complete" | "completed" | "done",
        Error => "error" | "failed",
    }
}

/// The four independently tracked status columns of `pipeline_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColumn {
    Download,
    Split,
    Listobs,
    Selfcal,
}

impl StatusColumn {
    pub const ALL: [StatusColumn; 4] = [
        StatusColumn::Download,
        StatusColumn::Split,
        StatusColumn::Listobs,
        StatusColumn::Selfcal,
    ];

    pub fn status_column(&self) -> &'static str {
        match self {
            StatusColumn::Download => "download_status",
            StatusColumn::Split => "pre_selfcal_split_status",
            StatusColumn::Listobs => "pre_selfcal_listobs_status",
            StatusColumn::Selfcal => "selfcal_status",
        }
    }

    pub fn started_at_column(&self) -> &'static str {
        match self {
            StatusColumn::Download => "download_started_at",
            StatusColumn::Split => "split_started_at",
            StatusColumn::Listobs => "listobs_started_at",
            StatusColumn::Selfcal => "selfcal_started_at",
        }
    }

    pub fn completed_at_column(&self) -> &'static str {
        match self {
            StatusColumn::Download => "download_completed_at",
            StatusColumn::Split => "split_completed_at",
            StatusColumn::Listobs => "listobs_completed_at",
            StatusColumn::Selfcal => "selfcal_completed_at",
        }
    }

    pub fn notes_column(&self) -> &'static str {
        match self {
            StatusColumn::Download => "download_notes",
            StatusColumn::Split => "split_notes",
            StatusColumn::Listobs => "listobs_notes",
            StatusColumn::Selfcal => "selfcal_notes",
        }
    }

    /// Canonical label for `raw` in this column, resolving aliases.
    pub fn canonical_label(&self, raw: &str) -> Option<&'static str> {
        match self {
            StatusColumn::Download => DownloadStatus::from_stored(raw).map(|s| s.as_str()),
            StatusColumn::Split => SplitStatus::from_stored(raw).map(|s| s.as_str()),
            StatusColumn::Listobs => ListobsStatus::from_stored(raw).map(|s| s.as_str()),
            StatusColumn::Selfcal => SelfcalStatus::from_stored(raw).map(|s| s.as_str()),
        }
    }

    /// Every canonical label this column may hold.
    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            StatusColumn::Download => DownloadStatus::ALL.iter().map(DownloadStatus::as_str).collect(),
            StatusColumn::Split => SplitStatus::ALL.iter().map(SplitStatus::as_str).collect(),
            StatusColumn::Listobs => ListobsStatus::ALL.iter().map(ListobsStatus::as_str).collect(),
            StatusColumn::Selfcal => SelfcalStatus::ALL.iter().map(SelfcalStatus::as_str).collect(),
        }
    }
}

impl fmt::Display for StatusColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_column())
    }
}

impl FromStr for StatusColumn {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "download" | "download_status" => Ok(StatusColumn::Download),
            "split" | "pre_selfcal_split_status" => Ok(StatusColumn::Split),
            "listobs" | "pre_selfcal_listobs_status" => Ok(StatusColumn::Listobs),
            "selfcal" | "selfcal_status" => Ok(StatusColumn::Selfcal),
            other => Err(AppError::ValidationError(format!("Unknown status column: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_canonical_labels() {
        assert_eq!(DownloadStatus::from_stored("Done"), Some(DownloadStatus::Complete));
        assert_eq!(DownloadStatus::from_stored(" downloaded "), Some(DownloadStatus::Downloaded));
        assert_eq!(SplitStatus::from_stored("split"), Some(SplitStatus::Split));
        assert_eq!(SplitStatus::from_stored("completed"), Some(SplitStatus::Complete));
        assert_eq!(SelfcalStatus::from_stored("failed"), Some(SelfcalStatus::Error));
        assert_eq!(ListobsStatus::from_stored("bogus"), None);
    }

    #[test]
    fn test_shared_labels_are_identical_across_columns() {
        for column in StatusColumn::ALL {
            assert_eq!(column.canonical_label("pending"), Some(PENDING));
            assert_eq!(column.canonical_label("in_progress"), Some(IN_PROGRESS));
            assert_eq!(column.canonical_label("error"), Some(ERROR));
            assert_eq!(column.canonical_label("complete"), Some("complete"));
        }
    }

    #[test]
    fn test_column_names() {
        assert_eq!(StatusColumn::Split.status_column(), "pre_selfcal_split_status");
        assert_eq!(StatusColumn::Listobs.started_at_column(), "listobs_started_at");
        assert_eq!("selfcal".parse::<StatusColumn>().unwrap(), StatusColumn::Selfcal);
        assert_eq!(SelfcalStatus::Prepped.to_string(), "prepped");
    }
}
