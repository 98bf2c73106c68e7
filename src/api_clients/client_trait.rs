use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

use crate::error::AppResult;
use crate::models::{MousId, RemoteJobStatus};

/// A headless job to launch on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub name: String,
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    /// Fixed resources; `None` lets the platform size the session.
    pub cores: Option<u32>,
    pub ram_gb: Option<u32>,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: command.into(),
            args,
            cores: None,
            ram_gb: None,
        }
    }

    pub fn with_resources(mut self, cores: u32, ram_gb: u32) -> Self {
        self.cores = Some(cores);
        self.ram_gb = Some(ram_gb);
        self
    }
}

/// Remote job submission service.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Launch a job and return its handle. Fails with `LaunchFailure` when
    /// the platform accepts the request but returns no handle.
    async fn submit_job(&self, request: &JobRequest) -> AppResult<String>;

    /// Current status of a job. `Ok(None)` is an empty or ambiguous answer.
    async fn poll_job(&self, job_id: &str) -> AppResult<Option<RemoteJobStatus>>;

    async fn terminate_job(&self, job_id: &str) -> AppResult<()>;
}

/// Pulls a remote archive into a local directory.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Populate `destination` (execution namespace) with the archive at `url`.
    async fn fetch_archive(&self, mous_id: &MousId, url: &str, destination: &Path) -> AppResult<()>;
}
