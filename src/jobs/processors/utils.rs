use std::path::{Path, PathBuf};

use crate::api_clients::JobRequest;
use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{MousId, PipelineStateRecord};
use crate::utils::date_utils::job_name_stamp;

/// A unit directory in both path namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDir {
    pub fs_id: String,
    pub storage: String,
    pub execution: PathBuf,
}

impl UnitDir {
    /// Resolve the recorded `mous_directory` of `record`.
    pub fn from_record(config: &PipelineConfig, mous_id: &MousId, record: &PipelineStateRecord) -> AppResult<Self> {
        let storage = record
            .mous_directory
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .ok_or_else(|| AppError::ValidationError(format!("No mous_directory recorded for {}", mous_id)))?;
        Ok(Self::from_storage(config, mous_id, storage))
    }

    pub fn from_storage(config: &PipelineConfig, mous_id: &MousId, storage: &str) -> Self {
        let storage = storage.trim_end_matches('/').to_string();
        Self {
            fs_id: mous_id.filesystem_form(),
            execution: config.namespaces.to_execution_path(&storage),
            storage,
        }
    }

    /// Storage path of an entry inside the unit directory.
    pub fn storage_child(&self, name: &str) -> String {
        format!("{}/{}", self.storage, name)
    }

    pub fn execution_child(&self, name: &str) -> PathBuf {
        self.execution.join(name)
    }
}

/// Headless CASA session that runs a task manifest through the driver script.
///
/// Arguments follow the helper script contract: unit ID, database path,
/// terminal log prefix, driver path, CASA log file and manifest path.
pub fn casa_manifest_request(
    config: &PipelineConfig,
    mous_id: &MousId,
    unit: &UnitDir,
    kind: &str,
    script: &Path,
    manifest_storage: &str,
) -> JobRequest {
    let stamp = job_name_stamp();
    let args = vec![
        mous_id.database_form(),
        config.storage_db_path(),
        unit.storage_child(&format!("{}_{}_terminal", unit.fs_id, kind)),
        config.storage_script(&config.scripts.casa_driver),
        unit.storage_child(&format!("casa-{}-{}.log", stamp, kind)),
        manifest_storage.to_string(),
    ];
    JobRequest::new(
        format!("casa-{}-{}", stamp, kind),
        config.casa_image.clone(),
        config.storage_script(script),
        args,
    )
}

/// Fail unless every path (storage namespace) exists on the execution host.
pub fn ensure_paths_exist(config: &PipelineConfig, paths: &[String]) -> AppResult<()> {
    let missing: Vec<&str> = paths
        .iter()
        .filter(|p| !config.namespaces.to_execution_path(p).exists())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::FileSystemError(format!("Missing products: {}", missing.join(", "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::path_utils::PathNamespaces;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::for_project_root("/mnt/vm/p");
        config.namespaces = PathNamespaces::new("/mnt/vm/p", "/arc/p");
        config
    }

    #[test]
    fn test_unit_dir_namespaces() {
        let mous = MousId::parse("uid://A001/X1/X2").unwrap();
        let unit = UnitDir::from_storage(&config(), &mous, "/arc/p/datasets/uid___A001_X1_X2/");
        assert_eq!(unit.execution, PathBuf::from("/mnt/vm/p/datasets/uid___A001_X1_X2"));
        assert_eq!(unit.storage_child("splits"), "/arc/p/datasets/uid___A001_X1_X2/splits");
    }

    #[test]
    fn test_casa_request_arguments() {
        let config = config();
        let mous = MousId::parse("uid://A001/X1/X2").unwrap();
        let unit = UnitDir::from_storage(&config, &mous, "/arc/p/datasets/uid___A001_X1_X2");
        let request = casa_manifest_request(
            &config,
            &mous,
            &unit,
            "splits",
            &config.scripts.split,
            "/arc/p/datasets/uid___A001_X1_X2/uid___A001_X1_X2_splits.json",
        );
        assert!(request.name.starts_with("casa-") && request.name.ends_with("-splits"));
        assert_eq!(request.command, "/arc/p/alma-sails-codebase/alma_ops/splits/run_split.sh");
        assert_eq!(request.args[0], "uid://A001/X1/X2");
        assert_eq!(request.args[1], "/arc/p/db/serpens_main.db");
        assert_eq!(request.args[2], "/arc/p/datasets/uid___A001_X1_X2/uid___A001_X1_X2_splits_terminal");
        assert_eq!(request.args.len(), 6);
        assert!(request.cores.is_none());
    }
}
