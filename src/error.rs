use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serde JSON error: {0}")]
    SerdeError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("HTTP client error: {0}")]
    HttpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File system error: {0}")]
    FileSystemError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Invalid MOUS ID: {0}")]
    InvalidMousId(String),

    /// A stage validator rejected the unit. Expected control flow for the dispatcher.
    #[error("Precondition failed on {field}: {reason}")]
    PreconditionFailed { field: String, reason: String },

    #[error("Job launch failed: {0}")]
    LaunchFailure(String),

    #[error("Job monitoring timed out: {0}")]
    MonitoringTimeout(String),

    #[error("Remote job ended with status {0}")]
    RemoteJobFailure(String),

    /// An archive transfer ran but did not complete.
    #[error("Archive fetch failed: {0}")]
    FetchFailure(String),

    #[error("Malformed spectral window remap: {0}")]
    MalformedRemap(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn precondition(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::PreconditionFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, AppError::PreconditionFailed { .. })
    }

    /// Stable code used in CLI output and stage notes.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::IoError(_) => "IO_ERROR",
            AppError::SerdeError(_) => "SERDE_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::HttpError(_) => "HTTP_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::FileSystemError(_) => "FILE_SYSTEM_ERROR",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFoundError(_) => "NOT_FOUND_ERROR",
            AppError::InvalidMousId(_) => "INVALID_MOUS_ID",
            AppError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            AppError::LaunchFailure(_) => "LAUNCH_FAILURE",
            AppError::MonitoringTimeout(_) => "MONITORING_TIMEOUT",
            AppError::RemoteJobFailure(_) => "REMOTE_JOB_FAILURE",
            AppError::FetchFailure(_) => "FETCH_FAILURE",
            AppError::MalformedRemap(_) => "MALFORMED_REMAP",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerdeError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        AppError::FileSystemError(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(error: String) -> Self {
        AppError::InternalError(error)
    }
}

impl From<&str> for AppError {
    fn from(error: &str) -> Self {
        AppError::InternalError(error.to_string())
    }
}
