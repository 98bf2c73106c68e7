use async_trait::async_trait;
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::api_clients::{ArchiveFetcher, JobRequest, SessionClient};
use crate::config::PipelineConfig;
use crate::error::AppResult;
use crate::jobs::monitor::JobMonitor;
use crate::jobs::retry_utils::submit_with_config;
use crate::models::MousId;
use crate::utils::date_utils::job_name_stamp;

/// Fetches archives by running the download script in a headless session on
/// the shared platform and waiting for it to finish.
pub struct SessionArchiveFetcher {
    client: Arc<dyn SessionClient>,
    config: Arc<PipelineConfig>,
}

impl SessionArchiveFetcher {
    pub fn new(client: Arc<dyn SessionClient>, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    pub fn build_request(&self, url: &str, destination: &Path) -> JobRequest {
        JobRequest::new(
            format!("wget2-{}", job_name_stamp()),
            self.config.transfer_image.clone(),
            self.config.storage_script(&self.config.scripts.download),
            vec![self.config.namespaces.to_storage_path(destination), url.to_string()],
        )
    }
}

#[async_trait]
impl ArchiveFetcher for SessionArchiveFetcher {
    fn name(&self) -> &str {
        "session"
    }

    async fn fetch_archive(&self, mous_id: &MousId, url: &str, destination: &Path) -> AppResult<()> {
        let request = self.build_request(url, destination);
        let job_id = submit_with_config(self.client.as_ref(), &request, &self.config).await?;
        info!("[{}] Launched download job: {}", mous_id, job_id);

        JobMonitor::from_config(Arc::clone(&self.client), &self.config)
            .wait_for_completion(&job_id)
            .await?;
        info!("[{}] Download job {} succeeded", mous_id, job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::monitor::tests::ScriptedClient;
    use crate::models::RemoteJobStatus;
    use crate::utils::path_utils::PathNamespaces;

    fn config() -> Arc<PipelineConfig> {
        let mut config = PipelineConfig::for_project_root("/mnt/vm/p");
        config.namespaces = PathNamespaces::new("/mnt/vm/p", "/arc/p");
        Arc::new(config)
    }

    #[test]
    fn test_download_request_uses_storage_paths() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let fetcher = SessionArchiveFetcher::new(client, config());
        let request = fetcher.build_request("https://archive/x", Path::new("/mnt/vm/p/datasets/uid___A_B_C_k2j"));
        assert_eq!(
            request.args,
            vec!["/arc/p/datasets/uid___A_B_C_k2j".to_string(), "https://archive/x".to_string()]
        );
        assert_eq!(request.command, "/arc/p/alma-sails-codebase/alma_ops/downloads/run_download.sh");
        assert!(request.name.starts_with("wget2-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_download_job_is_an_error() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(Some(RemoteJobStatus::Failed))]));
        let fetcher = SessionArchiveFetcher::new(client, config());
        let mous = MousId::parse("uid://A/B/C").unwrap();
        assert!(fetcher.fetch_archive(&mous, "https://x", Path::new("/tmp/x")).await.is_err());
    }
}
