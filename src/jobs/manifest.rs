//! Task manifests consumed by the CASA driver inside remote sessions.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::constants::{LISTOBS_SUFFIX, SPLIT_INTENT, SPLITS_DIR_NAME};
use crate::error::{AppError, AppResult};
use crate::utils::path_utils::{product_stem, sanitize_filename};

/// One CASA task invocation. Serialized with a `task` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum CasaTask {
    Split {
        vis: String,
        outputvis: String,
        field: String,
        spw: String,
        datacolumn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
    },
    Listobs {
        vis: String,
        listfile: String,
    },
}

impl CasaTask {
    pub fn vis(&self) -> &str {
        match self {
            CasaTask::Split { vis, .. } | CasaTask::Listobs { vis, .. } => vis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub unit_id: String,
    pub db_path: String,
    pub datasets_dir: String,
    pub tasks: Vec<CasaTask>,
}

impl TaskManifest {
    /// Output measurement sets of every split task, in task order.
    pub fn split_outputs(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|task| match task {
                CasaTask::Split { outputvis, .. } => Some(outputvis.clone()),
                CasaTask::Listobs { .. } => None,
            })
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| AppError::FileSystemError(format!("Failed to write manifest {}: {}", path.display(), e)))?;
        info!("[{}] Wrote task manifest {} ({} tasks)", self.unit_id, path.display(), self.tasks.len());
        Ok(())
    }

    pub fn read_from(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::FileSystemError(format!("Failed to read manifest {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One split task per (calibrated product, target).
///
/// `mous_dir` is the storage-namespace unit directory; outputs land in its
/// `splits/` subdirectory. Targets with no known spectral windows split every
/// window.
pub fn build_split_tasks(
    calibrated_products: &[String],
    spw_mapping: &BTreeMap<String, BTreeSet<i32>>,
    datacolumn: &str,
    mous_dir: &str,
    restrict_intent: bool,
) -> AppResult<Vec<CasaTask>> {
    if calibrated_products.is_empty() {
        return Err(AppError::ValidationError("no calibrated products to split".to_string()));
    }
    if spw_mapping.is_empty() {
        return Err(AppError::ValidationError("no targets recorded for unit".to_string()));
    }

    let splits_dir = format!("{}/{}", mous_dir.trim_end_matches('/'), SPLITS_DIR_NAME);
    let mut tasks = Vec::with_capacity(calibrated_products.len() * spw_mapping.len());

    for product in calibrated_products {
        let stem = product_stem(product);
        for (target, spws) in spw_mapping {
            let spw = spws.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            tasks.push(CasaTask::Split {
                vis: product.clone(),
                outputvis: format!("{}/{}_{}_targets.ms", splits_dir, stem, sanitize_filename(target)),
                field: target.clone(),
                spw,
                datacolumn: datacolumn.to_string(),
                intent: restrict_intent.then(|| SPLIT_INTENT.to_string()),
            });
        }
    }

    Ok(tasks)
}

/// One listobs task per product; the summary is written next to the data.
pub fn build_listobs_tasks<S: AsRef<str>>(products: &[S]) -> Vec<CasaTask> {
    let mut seen = BTreeSet::new();
    products
        .iter()
        .map(|p| p.as_ref().trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .map(|vis| CasaTask::Listobs {
            listfile: format!("{}{}", vis, LISTOBS_SUFFIX),
            vis,
        })
        .collect()
}
