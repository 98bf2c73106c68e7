use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::error::{AppError, AppResult};
use crate::jobs::dispatcher::PipelineDispatcher;

/// Message to control the pipeline scheduler
#[derive(Debug)]
enum SchedulerMessage {
    Start,
    Pause,
    Resume,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Paused,
}

/// Runs dispatcher scans on a fixed interval.
///
/// Stage executions started by a scan run on their own tasks; the scheduler
/// never waits for them.
pub struct PipelineScheduler {
    tx: mpsc::Sender<SchedulerMessage>,
    state: Arc<Mutex<SchedulerState>>,
    scans: Arc<Mutex<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineScheduler {
    pub fn new(dispatcher: Arc<PipelineDispatcher>, scan_interval: Duration, dry_run: bool) -> Self {
        let (tx, rx) = mpsc::channel(10);
        let state = Arc::new(Mutex::new(SchedulerState::Stopped));
        let scans = Arc::new(Mutex::new(0));

        let task = tokio::spawn(Self::run(
            rx,
            dispatcher,
            scan_interval,
            dry_run,
            Arc::clone(&state),
            Arc::clone(&scans),
        ));

        Self {
            tx,
            state,
            scans,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(
        mut rx: mpsc::Receiver<SchedulerMessage>,
        dispatcher: Arc<PipelineDispatcher>,
        scan_interval: Duration,
        dry_run: bool,
        state: Arc<Mutex<SchedulerState>>,
        scans: Arc<Mutex<u64>>,
    ) {
        let mut interval = interval(scan_interval);

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::Start) => {
                            info!("Starting pipeline scheduler (every {:?})", scan_interval);
                            *state.lock().await = SchedulerState::Running;
                            interval.reset_immediately();
                        }
                        Some(SchedulerMessage::Pause) => {
                            info!("Pausing pipeline scheduler");
                            *state.lock().await = SchedulerState::Paused;
                        }
                        Some(SchedulerMessage::Resume) => {
                            info!("Resuming pipeline scheduler");
                            *state.lock().await = SchedulerState::Running;
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Shutting down pipeline scheduler");
                            *state.lock().await = SchedulerState::Stopped;
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if *state.lock().await != SchedulerState::Running {
                        continue;
                    }
                    match dispatcher.scan(dry_run).await {
                        Ok(report) => {
                            *scans.lock().await += 1;
                            debug!("Scan started {} stage executions", report.triggered_count());
                        }
                        Err(e) => error!("Pipeline scan failed: {}", e),
                    }
                }
            }
        }
    }

    async fn send(&self, msg: SchedulerMessage) -> AppResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to send {:?} to scheduler", e.0)))
    }

    pub async fn start(&self) -> AppResult<()> {
        self.send(SchedulerMessage::Start).await
    }

    pub async fn pause(&self) -> AppResult<()> {
        self.send(SchedulerMessage::Pause).await
    }

    pub async fn resume(&self) -> AppResult<()> {
        self.send(SchedulerMessage::Resume).await
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.send(SchedulerMessage::Shutdown).await?;
        if let Some(task) = self.task.lock().await.take() {
            task.await
                .map_err(|e| AppError::InternalError(format!("Scheduler task failed: {}", e)))?;
        }
        Ok(())
    }

    pub async fn get_state(&self) -> SchedulerState {
        *self.state.lock().await
    }

    /// Number of scans completed since creation.
    pub async fn scan_count(&self) -> u64 {
        *self.scans.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    use crate::api_clients::{SessionClient, Wget2Fetcher};
    use crate::config::PipelineConfig;
    use crate::db_utils::{PipelineStateRepository, open_in_memory_pool};
    use crate::jobs::executor::StageContext;
    use crate::jobs::monitor::tests::ScriptedClient;
    use crate::jobs::registry::StageRegistry;
    use crate::models::{DownloadStatus, MousId, UnitImport};

    const UNIT: &str = "uid://A001/X1/X1";

    async fn dispatcher(root: &std::path::Path) -> (Arc<PipelineDispatcher>, Arc<PipelineStateRepository>) {
        let pool = open_in_memory_pool().await.unwrap();
        let repo = Arc::new(PipelineStateRepository::new(Arc::new(pool)));
        repo.register_units(&[UnitImport {
            mous_id: UNIT.to_string(),
            num_asdms: Some(1),
            asdm_paths: vec![],
            download_url: Some("https://archive/x".to_string()),
            preferred_datacolumn: None,
            targets: vec![],
        }])
        .await
        .unwrap();

        let session_client: Arc<dyn SessionClient> = Arc::new(ScriptedClient::new(vec![Ok(None)]));
        let ctx = Arc::new(StageContext::new(
            Arc::new(PipelineConfig::for_project_root(root)),
            Arc::clone(&repo),
            session_client,
            Arc::new(Wget2Fetcher::new(vec![]).with_program("false")),
        ));
        let registry = Arc::new(StageRegistry::with_default_processors().await);
        (Arc::new(PipelineDispatcher::new(ctx, registry)), repo)
    }

    async fn eventually<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let wait = async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
    }

    #[tokio::test]
    async fn test_scans_follow_start_pause_resume_and_shutdown() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (dispatcher, repo) = dispatcher(tmp.path()).await;
        let owned = PipelineScheduler::new(dispatcher, Duration::from_millis(10), true);
        let scheduler = &owned;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scheduler.get_state().await, SchedulerState::Stopped);
        assert_eq!(scheduler.scan_count().await, 0);

        scheduler.start().await.unwrap();
        eventually(move || async move { scheduler.scan_count().await >= 3 }).await;
        assert_eq!(scheduler.get_state().await, SchedulerState::Running);

        scheduler.pause().await.unwrap();
        eventually(move || async move { scheduler.get_state().await == SchedulerState::Paused }).await;
        let paused_at = scheduler.scan_count().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.scan_count().await, paused_at);

        scheduler.resume().await.unwrap();
        eventually(move || async move { scheduler.scan_count().await > paused_at }).await;

        scheduler.shutdown().await.unwrap();
        assert_eq!(scheduler.get_state().await, SchedulerState::Stopped);
        assert!(scheduler.shutdown().await.is_err());

        // dry-run scans never start anything
        let record = repo.get_record(&MousId::parse(UNIT).unwrap()).await.unwrap();
        assert_eq!(record.download_status, Some(DownloadStatus::Pending));
    }
}
