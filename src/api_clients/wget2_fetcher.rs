use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::Path;
use tokio::process::Command;

use crate::api_clients::client_trait::ArchiveFetcher;
use crate::constants::WGET2_RECURSION_DEPTH;
use crate::error::{AppError, AppResult};
use crate::models::MousId;

/// Mirrors an archive with a local `wget2` process.
#[derive(Debug, Clone)]
pub struct Wget2Fetcher {
    program: String,
    depth: u32,
    tolerated_codes: Vec<i32>,
}

impl Wget2Fetcher {
    pub fn new(tolerated_codes: Vec<i32>) -> Self {
        Self {
            program: "wget2".to_string(),
            depth: WGET2_RECURSION_DEPTH,
            tolerated_codes,
        }
    }

    /// Use a different executable (a wrapper script, or a stand-in for tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_args(&self, url: &str, destination: &Path) -> Vec<String> {
        vec![
            "-r".to_string(),
            format!("-l{}", self.depth),
            "--reject-regex=index.html*".to_string(),
            "-np".to_string(),
            "-nH".to_string(),
            "--cut-dirs=3".to_string(),
            "-P".to_string(),
            destination.to_string_lossy().to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl ArchiveFetcher for Wget2Fetcher {
    fn name(&self) -> &str {
        "wget2"
    }

    async fn fetch_archive(&self, mous_id: &MousId, url: &str, destination: &Path) -> AppResult<()> {
        tokio::fs::create_dir_all(destination).await?;

        let args = self.build_args(url, destination);
        info!("[{}] Starting {} download into {}", mous_id, self.program, destination.display());
        debug!("Command: {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| AppError::LaunchFailure(format!("Failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            info!("[{}] {} completed successfully.", mous_id, self.program);
            return Ok(());
        }

        match output.status.code() {
            Some(code) if self.tolerated_codes.contains(&code) => {
                warn!("[{}] {} returned tolerated error {}; continuing anyway.", mous_id, self.program, code);
                Ok(())
            }
            code => Err(AppError::FetchFailure(format!(
                "{} failed with code {}: {}",
                self.program,
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mous() -> MousId {
        MousId::parse("uid://A001/X1/X2").unwrap()
    }

    #[test]
    fn test_mirror_arguments() {
        let fetcher = Wget2Fetcher::new(vec![8]);
        let args = fetcher.build_args("https://archive/x/", Path::new("/data/tmp"));
        assert_eq!(args[1], "-l10");
        assert_eq!(&args[args.len() - 3..], &["-P", "/data/tmp", "https://archive/x/"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes() {
        let tmp = TempDir::new().unwrap();

        // `false` exits 1 whatever its arguments
        let strict = Wget2Fetcher::new(vec![8]).with_program("false");
        let err = strict.fetch_archive(&mous(), "https://x", tmp.path()).await.unwrap_err();
        assert!(matches!(err, AppError::FetchFailure(_)), "{:?}", err);
        assert_eq!(err.code(), "FETCH_FAILURE");

        let missing = Wget2Fetcher::new(vec![]).with_program("/nonexistent/wget2");
        assert!(matches!(
            missing.fetch_archive(&mous(), "https://x", tmp.path()).await,
            Err(AppError::LaunchFailure(_))
        ));

        let tolerant = Wget2Fetcher::new(vec![1]).with_program("false");
        assert!(tolerant.fetch_archive(&mous(), "https://x", tmp.path()).await.is_ok());

        let ok = Wget2Fetcher::new(vec![]).with_program("true");
        assert!(ok.fetch_archive(&mous(), "https://x", tmp.path()).await.is_ok());
    }
}
