use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::error::{AppError, AppResult};
use crate::utils::env_utils::{read_env, read_env_bool, read_env_i32_list, read_env_opt, read_env_u64};
use crate::utils::path_utils::PathNamespaces;

/// How the download stage pulls an archive into its staging directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherKind {
    /// Launch a headless session running the download script on the shared platform.
    Session,
    /// Run `wget2` directly on the execution host.
    Wget2,
}

impl FromStr for FetcherKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "session" | "headless" => Ok(FetcherKind::Session),
            "wget2" | "local" => Ok(FetcherKind::Wget2),
            other => Err(AppError::ConfigError(format!("Unknown archive fetcher: {}", other))),
        }
    }
}

/// Helper scripts launched inside remote sessions. Held in the execution
/// namespace; processors convert them before handing them to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPaths {
    pub download: PathBuf,
    pub split: PathBuf,
    pub listobs: PathBuf,
    pub selfcal_prep: PathBuf,
    pub selfcal_fixed: PathBuf,
    pub selfcal_flexible: PathBuf,
    pub casa_driver: PathBuf,
    pub auto_selfcal_entry: PathBuf,
}

impl ScriptPaths {
    pub fn under(project_root: &Path) -> Self {
        let ops = project_root.join(CODEBASE_DIR_NAME).join("alma_ops");
        Self {
            download: ops.join("downloads").join("run_download.sh"),
            split: ops.join("splits").join("run_split.sh"),
            listobs: ops.join("listobs").join("run_listobs.sh"),
            selfcal_prep: ops.join("autoselfcal").join("run_autoselfcal_prep.sh"),
            selfcal_fixed: ops.join("autoselfcal").join("run_autoselfcal_fixed.sh"),
            selfcal_flexible: ops.join("autoselfcal").join("run_autoselfcal_flexible.sh"),
            casa_driver: ops.join("casa_driver.py"),
            auto_selfcal_entry: project_root.join("auto_selfcal").join("bin").join("auto_selfcal.py"),
        }
    }
}

/// Everything the dispatcher and the stage processors need to know about
/// their environment. Built once and shared behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    pub db_path: PathBuf,
    pub datasets_dir: PathBuf,
    pub weblog_dir: PathBuf,
    pub namespaces: PathNamespaces,

    pub session_api_url: String,
    #[serde(skip_serializing)]
    pub session_api_token: Option<String>,

    pub casa_image: String,
    pub casa_pipeline_image: String,
    pub transfer_image: String,
    pub scripts: ScriptPaths,
    pub archive_fetcher: FetcherKind,

    pub poll_interval: Duration,
    pub max_empty_responses: u32,
    pub submit_retries: u32,
    pub submit_retry_delay: Duration,
    pub stale_after: Duration,

    pub selfcal_cores: u32,
    pub selfcal_ram_gb: u32,
    pub fixed_selfcal_session: bool,

    pub remove_staging_dirs: bool,
    pub tolerated_fetch_codes: Vec<i32>,
}

impl PipelineConfig {
    /// Configuration rooted at `project_root` with every other value at its default.
    pub fn for_project_root(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            db_path: project_root.join(DB_DIR_NAME).join(DB_FILENAME),
            datasets_dir: project_root.join(DATASETS_DIR_NAME),
            weblog_dir: project_root.join(WEBLOG_DIR_NAME),
            scripts: ScriptPaths::under(&project_root),
            namespaces: PathNamespaces::default(),
            session_api_url: DEFAULT_SESSION_API_URL.to_string(),
            session_api_token: None,
            casa_image: DEFAULT_CASA_IMAGE.to_string(),
            casa_pipeline_image: DEFAULT_CASA_PIPELINE_IMAGE.to_string(),
            transfer_image: DEFAULT_TRANSFER_IMAGE.to_string(),
            archive_fetcher: FetcherKind::Session,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_empty_responses: DEFAULT_MAX_EMPTY_RESPONSES,
            submit_retries: DEFAULT_SUBMIT_RETRIES,
            submit_retry_delay: DEFAULT_SUBMIT_RETRY_DELAY,
            stale_after: DEFAULT_STALE_AFTER,
            selfcal_cores: DEFAULT_SELFCAL_CORES,
            selfcal_ram_gb: DEFAULT_SELFCAL_RAM_GB,
            fixed_selfcal_session: true,
            remove_staging_dirs: false,
            tolerated_fetch_codes: DEFAULT_TOLERATED_FETCH_CODES.to_vec(),
            project_root,
        }
    }

    /// Load configuration from `.env` and `ALMA_*` environment variables.
    ///
    /// The project root defaults to the execution-side mount of the shared
    /// project space; every directory not set explicitly hangs off it.
    pub fn from_env() -> AppResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Failed to load .env file: {}", e),
        }

        let execution_prefix = read_env("EXECUTION_PREFIX", DEFAULT_EXECUTION_PREFIX);
        let storage_prefix = read_env("STORAGE_PREFIX", DEFAULT_STORAGE_PREFIX);
        let project_root = PathBuf::from(read_env("PROJECT_ROOT", &execution_prefix));

        let mut config = Self::for_project_root(&project_root);
        config.namespaces = PathNamespaces::new(execution_prefix, storage_prefix);

        if let Some(db_path) = read_env_opt("DB_PATH") {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(dir) = read_env_opt("DATASETS_DIR") {
            config.datasets_dir = PathBuf::from(dir);
        }
        if let Some(dir) = read_env_opt("WEBLOG_DIR") {
            config.weblog_dir = PathBuf::from(dir);
        }

        config.session_api_url = read_env("SESSION_API_URL", DEFAULT_SESSION_API_URL);
        config.session_api_token = read_env_opt("SESSION_API_TOKEN");
        config.casa_image = read_env("CASA_IMAGE", DEFAULT_CASA_IMAGE);
        config.casa_pipeline_image = read_env("CASA_PIPELINE_IMAGE", DEFAULT_CASA_PIPELINE_IMAGE);
        config.transfer_image = read_env("TRANSFER_IMAGE", DEFAULT_TRANSFER_IMAGE);
        if let Some(kind) = read_env_opt("ARCHIVE_FETCHER") {
            config.archive_fetcher = kind.parse()?;
        }

        config.poll_interval =
            Duration::from_secs(read_env_u64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs()));
        config.max_empty_responses = u32::try_from(read_env_u64(
            "MAX_EMPTY_RESPONSES",
            u64::from(DEFAULT_MAX_EMPTY_RESPONSES),
        ))
        .map_err(|e| AppError::ConfigError(format!("MAX_EMPTY_RESPONSES out of range: {}", e)))?;
        config.submit_retries = u32::try_from(read_env_u64("SUBMIT_RETRIES", u64::from(DEFAULT_SUBMIT_RETRIES)))
            .map_err(|e| AppError::ConfigError(format!("SUBMIT_RETRIES out of range: {}", e)))?;
        config.submit_retry_delay = Duration::from_secs(read_env_u64(
            "SUBMIT_RETRY_DELAY_SECS",
            DEFAULT_SUBMIT_RETRY_DELAY.as_secs(),
        ));
        config.stale_after =
            Duration::from_secs(read_env_u64("STALE_AFTER_SECS", DEFAULT_STALE_AFTER.as_secs()));

        config.selfcal_cores = u32::try_from(read_env_u64("SELFCAL_CORES", u64::from(DEFAULT_SELFCAL_CORES)))
            .map_err(|e| AppError::ConfigError(format!("SELFCAL_CORES out of range: {}", e)))?;
        config.selfcal_ram_gb = u32::try_from(read_env_u64("SELFCAL_RAM_GB", u64::from(DEFAULT_SELFCAL_RAM_GB)))
            .map_err(|e| AppError::ConfigError(format!("SELFCAL_RAM_GB out of range: {}", e)))?;
        config.fixed_selfcal_session = read_env_bool("FIXED_SELFCAL_SESSION", true);

        config.remove_staging_dirs = read_env_bool("REMOVE_STAGING_DIRS", false);
        config.tolerated_fetch_codes = read_env_i32_list("TOLERATED_FETCH_CODES", DEFAULT_TOLERATED_FETCH_CODES);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_empty_responses == 0 {
            return Err(AppError::ConfigError("max_empty_responses must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::ConfigError("poll_interval must be positive".to_string()));
        }
        if self.session_api_url.trim().is_empty() {
            return Err(AppError::ConfigError("session_api_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Canonical per-unit directory on the execution host.
    pub fn unit_dir(&self, fs_id: &str) -> PathBuf {
        self.datasets_dir.join(fs_id)
    }

    /// Destination root for a unit's report bundles on the execution host.
    pub fn unit_weblog_dir(&self, fs_id: &str) -> PathBuf {
        self.weblog_dir.join(fs_id)
    }

    /// Database path as seen by remote sessions.
    pub fn storage_db_path(&self) -> String {
        self.namespaces.to_storage_path(&self.db_path)
    }

    /// Storage-side form of a helper script path.
    pub fn storage_script(&self, script: &Path) -> String {
        self.namespaces.to_storage_path(script)
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_hang_off_project_root() {
        let config = PipelineConfig::for_project_root("/mnt/project");
        assert_eq!(config.db_path, PathBuf::from("/mnt/project/db/serpens_main.db"));
        assert_eq!(config.datasets_dir, PathBuf::from("/mnt/project/datasets"));
        assert_eq!(config.weblog_dir, PathBuf::from("/mnt/project/SRDP_weblogs"));
        assert_eq!(
            config.scripts.split,
            PathBuf::from("/mnt/project/alma-sails-codebase/alma_ops/splits/run_split.sh")
        );
        assert_eq!(config.max_empty_responses, 3);
        assert_eq!(config.tolerated_fetch_codes, vec![8]);
        assert!(!config.remove_staging_dirs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_paths_use_namespaces() {
        let mut config = PipelineConfig::for_project_root("/mnt/vm/project");
        config.namespaces = PathNamespaces::new("/mnt/vm/project", "/arc/projects/project");
        assert_eq!(config.storage_db_path(), "/arc/projects/project/db/serpens_main.db");
        assert_eq!(
            config.storage_script(&config.scripts.casa_driver),
            "/arc/projects/project/alma-sails-codebase/alma_ops/casa_driver.py"
        );
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let mut config = PipelineConfig::for_project_root("/tmp/p");
        config.max_empty_responses = 0;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_fetcher_kind_parsing() {
        assert_eq!("wget2".parse::<FetcherKind>().unwrap(), FetcherKind::Wget2);
        assert_eq!(" Session ".parse::<FetcherKind>().unwrap(), FetcherKind::Session);
        assert!("ftp".parse::<FetcherKind>().is_err());
    }
}
