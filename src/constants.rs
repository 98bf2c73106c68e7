use std::time::Duration;

// Database
pub const DB_DIR_NAME: &str = "db";
pub const DB_FILENAME: &str = "serpens_main.db";
pub const DB_BUSY_TIMEOUT_SECONDS: u64 = 30;

// Project layout, relative to the project root
pub const DATASETS_DIR_NAME: &str = "datasets";
pub const WEBLOG_DIR_NAME: &str = "SRDP_weblogs";
pub const CODEBASE_DIR_NAME: &str = "alma-sails-codebase";

// Path namespaces: what the execution host mounts vs what the shared platform sees
pub const DEFAULT_EXECUTION_PREFIX: &str = "/home/ubuntu/canfar_arc/projects/ALMA-SAILS";
pub const DEFAULT_STORAGE_PREFIX: &str = "/arc/projects/ALMA-SAILS";

// Container images
pub const DEFAULT_CASA_IMAGE: &str = "images.canfar.net/casa-6/casa:6.6.4-34";
pub const DEFAULT_CASA_PIPELINE_IMAGE: &str = "images.canfar.net/casa-6/casa:6.5.4-9-pipeline";
pub const DEFAULT_TRANSFER_IMAGE: &str = "images.canfar.net/skaha/astroml:25.10";

// Headless session service
pub const DEFAULT_SESSION_API_URL: &str = "https://ws-uv.canfar.net/skaha/v0";

// Remote job monitoring
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_EMPTY_RESPONSES: u32 = 3;
pub const DEFAULT_SUBMIT_RETRIES: u32 = 2;
pub const DEFAULT_SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(30);

// An attempt left in_progress longer than this is expired to error
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(48 * 60 * 60);

// Self-calibration session resources
pub const DEFAULT_SELFCAL_CORES: u32 = 4;
pub const DEFAULT_SELFCAL_RAM_GB: u32 = 32;

// wget2 exit code 8: "Server issued an error response", routine for the SRDP service
pub const DEFAULT_TOLERATED_FETCH_CODES: &[i32] = &[8];
pub const WGET2_RECURSION_DEPTH: u32 = 10;

// Artifact discovery
pub const DATA_PRODUCT_SUFFIX: &str = ".ms";
pub const REPORT_BUNDLE_DIR_NAME: &str = "weblog_restore";

// Per-unit working directories
pub const SPLITS_DIR_NAME: &str = "splits";
pub const AUTO_SELFCAL_DIR_NAME: &str = "auto_selfcal";

// CASA task defaults
pub const DEFAULT_DATACOLUMN: &str = "data";
pub const SPLIT_INTENT: &str = "*OBSERVE_TARGET*";
pub const LISTOBS_SUFFIX: &str = ".listobs.txt";

/// Entries of the auto_selfcal directory that survive post-selfcal cleanup.
pub const SELFCAL_KEEP_PATTERNS: &[&str] = &[
    "*_targets.ms",
    "*_targets.contsub.ms",
    "*.g",
    "applycal_to_orig_MSes.py",
    "uvcontsub_orig_MSes.py",
    "selfcal_library.pickle",
    "selfcal_plan.pickle",
    "cont.dat",
    "pipeline-*",
    "weblog",
    "casa*.log",
];
