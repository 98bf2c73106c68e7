use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::api_clients::SessionClient;
use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use crate::models::RemoteJobStatus;

/// Polls a remote job until it reaches a terminal status.
pub struct JobMonitor {
    client: Arc<dyn SessionClient>,
    poll_interval: Duration,
    max_empty_responses: u32,
}

impl JobMonitor {
    pub fn new(client: Arc<dyn SessionClient>, poll_interval: Duration, max_empty_responses: u32) -> Self {
        Self {
            client,
            poll_interval,
            max_empty_responses: max_empty_responses.max(1),
        }
    }

    pub fn from_config(client: Arc<dyn SessionClient>, config: &PipelineConfig) -> Self {
        Self::new(client, config.poll_interval, config.max_empty_responses)
    }

    /// Block until `job_id` succeeds.
    ///
    /// Empty answers and query errors share one budget of consecutive misses;
    /// any recognised status resets it. Failed or terminated jobs surface as
    /// `RemoteJobFailure` carrying the platform status.
    pub async fn wait_for_completion(&self, job_id: &str) -> AppResult<RemoteJobStatus> {
        let mut misses: u32 = 0;
        let mut last_status: Option<RemoteJobStatus> = None;

        loop {
            match self.client.poll_job(job_id).await {
                Ok(Some(status)) => {
                    misses = 0;
                    if last_status != Some(status) {
                        info!("Job {} status: {}", job_id, status);
                        last_status = Some(status);
                    }
                    if status.is_success() {
                        return Ok(status);
                    }
                    if status.is_terminal() {
                        return Err(AppError::RemoteJobFailure(status.to_string()));
                    }
                }
                Ok(None) => {
                    misses += 1;
                    warn!(
                        "Empty status for job {} ({}/{})",
                        job_id, misses, self.max_empty_responses
                    );
                }
                Err(e) => {
                    misses += 1;
                    warn!(
                        "Status query for job {} failed ({}/{}): {}",
                        job_id, misses, self.max_empty_responses, e
                    );
                }
            }

            if misses >= self.max_empty_responses {
                return Err(AppError::MonitoringTimeout(format!(
                    "job {} gave no usable status after {} consecutive attempts",
                    job_id, misses
                )));
            }

            debug!("Checking job {} again in {:?}", job_id, self.poll_interval);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api_clients::JobRequest;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays a fixed sequence of poll answers; repeats the last one when exhausted.
    pub(crate) struct ScriptedClient {
        answers: Mutex<VecDeque<AppResult<Option<RemoteJobStatus>>>>,
        pub polls: Mutex<u32>,
    }

    impl ScriptedClient {
        pub(crate) fn new(answers: Vec<AppResult<Option<RemoteJobStatus>>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionClient for ScriptedClient {
        async fn submit_job(&self, _request: &JobRequest) -> AppResult<String> {
            Ok("job-1".to_string())
        }

        async fn poll_job(&self, _job_id: &str) -> AppResult<Option<RemoteJobStatus>> {
            *self.polls.lock().await += 1;
            let mut answers = self.answers.lock().await;
            if answers.len() > 1 {
                answers.pop_front().unwrap_or(Ok(None))
            } else {
                answers.front().cloned().unwrap_or(Ok(None))
            }
        }

        async fn terminate_job(&self, _job_id: &str) -> AppResult<()> {
            Ok(())
        }
    }

    fn monitor(client: Arc<ScriptedClient>) -> JobMonitor {
        JobMonitor::new(client, Duration::from_secs(60), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_running() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Some(RemoteJobStatus::Pending)),
            Ok(Some(RemoteJobStatus::Running)),
            Ok(Some(RemoteJobStatus::Succeeded)),
        ]));
        let status = monitor(client.clone()).wait_for_completion("job-1").await.unwrap();
        assert_eq!(status, RemoteJobStatus::Succeeded);
        assert_eq!(*client.polls.lock().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_empty_responses_time_out() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(None)]));
        let err = monitor(client.clone()).wait_for_completion("job-1").await.unwrap_err();
        assert!(matches!(err, AppError::MonitoringTimeout(_)));
        assert_eq!(*client.polls.lock().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_share_the_empty_budget() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(None),
            Err(AppError::HttpError("503".to_string())),
            Ok(None),
        ]));
        let err = monitor(client).wait_for_completion("job-1").await.unwrap_err();
        assert!(matches!(err, AppError::MonitoringTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_status_resets_budget() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(None),
            Ok(None),
            Ok(Some(RemoteJobStatus::Running)),
            Ok(None),
            Ok(None),
            Ok(Some(RemoteJobStatus::Succeeded)),
        ]));
        assert!(monitor(client).wait_for_completion("job-1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failures_carry_status() {
        for terminal in [RemoteJobStatus::Failed, RemoteJobStatus::Terminated] {
            let client = Arc::new(ScriptedClient::new(vec![
                Ok(Some(RemoteJobStatus::Running)),
                Ok(Some(terminal)),
            ]));
            let err = monitor(client).wait_for_completion("job-1").await.unwrap_err();
            assert_eq!(err, AppError::RemoteJobFailure(terminal.to_string()));
        }
    }
}
