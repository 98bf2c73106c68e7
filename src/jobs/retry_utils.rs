use log::{debug, warn};
use std::time::Duration;

use crate::api_clients::{JobRequest, SessionClient};
use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};

/// Whether a failed submission is worth repeating.
pub fn is_retryable(error: &AppError) -> bool {
    !matches!(
        error,
        AppError::ConfigError(_)
            | AppError::ValidationError(_)
            | AppError::SerdeError(_)
            | AppError::InvalidMousId(_)
            | AppError::PreconditionFailed { .. }
    )
}

/// Submit `request`, retrying up to `retries` more times on retryable errors.
///
/// Only the submission call is repeated; monitoring a job that was launched
/// is never retried here.
pub async fn submit_with_retry(
    client: &dyn SessionClient,
    request: &JobRequest,
    retries: u32,
    delay: Duration,
) -> AppResult<String> {
    let mut attempt: u32 = 0;
    loop {
        match client.submit_job(request).await {
            Ok(job_id) => {
                debug!("Job '{}' launched as {} (attempt {})", request.name, job_id, attempt + 1);
                return Ok(job_id);
            }
            Err(e) if attempt < retries && is_retryable(&e) => {
                attempt += 1;
                warn!(
                    "Launching job '{}' failed, retrying in {:?} ({}/{}): {}",
                    request.name, delay, attempt, retries, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn submit_with_config(
    client: &dyn SessionClient,
    request: &JobRequest,
    config: &PipelineConfig,
) -> AppResult<String> {
    submit_with_retry(client, request, config.submit_retries, config.submit_retry_delay).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteJobStatus;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct FlakyLauncher {
        failures_left: Mutex<u32>,
        error: AppError,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl SessionClient for FlakyLauncher {
        async fn submit_job(&self, _request: &JobRequest) -> AppResult<String> {
            *self.calls.lock().await += 1;
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(self.error.clone());
            }
            Ok("session-42".to_string())
        }

        async fn poll_job(&self, _job_id: &str) -> AppResult<Option<RemoteJobStatus>> {
            Ok(None)
        }

        async fn terminate_job(&self, _job_id: &str) -> AppResult<()> {
            Ok(())
        }
    }

    fn launcher(failures: u32, error: AppError) -> FlakyLauncher {
        FlakyLauncher {
            failures_left: Mutex::new(failures),
            error,
            calls: Mutex::new(0),
        }
    }

    fn request() -> JobRequest {
        JobRequest::new("casa-split", "casa:6", "run_split.sh", vec![])
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let client = launcher(2, AppError::LaunchFailure("no id".to_string()));
        let id = submit_with_retry(&client, &request(), 2, Duration::from_secs(30)).await.unwrap();
        assert_eq!(id, "session-42");
        assert_eq!(*client.calls.lock().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let client = launcher(5, AppError::LaunchFailure("no id".to_string()));
        let err = submit_with_retry(&client, &request(), 2, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, AppError::LaunchFailure(_)));
        assert_eq!(*client.calls.lock().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_errors_are_not_retried() {
        let client = launcher(1, AppError::ConfigError("bad url".to_string()));
        assert!(submit_with_retry(&client, &request(), 2, Duration::from_secs(30)).await.is_err());
        assert_eq!(*client.calls.lock().await, 1);
    }
}
