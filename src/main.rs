use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use alma_pipeline::api_clients::{ArchiveFetcher, HttpSessionClient, SessionClient, Wget2Fetcher};
use alma_pipeline::config::{FetcherKind, PipelineConfig};
use alma_pipeline::db_utils::{PipelineStateRepository, open_pool};
use alma_pipeline::error::{AppError, AppResult};
use alma_pipeline::jobs::processors::cleanup_selfcal_dir;
use alma_pipeline::jobs::validators::check_stage;
use alma_pipeline::jobs::{PipelineDispatcher, PipelineScheduler, SessionArchiveFetcher, StageContext, StageRegistry};
use alma_pipeline::models::{MousId, SpwRemap, Stage, StatusColumn, UnitImport};

#[derive(Parser)]
#[command(name = "alma-pipeline")]
#[command(about = "Drive ALMA units through the download, split, listobs and self-calibration stages", long_about = None)]
struct Cli {
    /// SQLite database (defaults to ALMA_DB_PATH or <project root>/db/serpens_main.db)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Report decisions without changing any state or starting any job
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Register units and their targets from a JSON array
    Import { file: PathBuf },
    /// Set the archive URL of a unit
    SetUrl { mous_id: String, url: String },
    /// Add spectral window remap entries, e.g. `16:0 18:1`
    AddRemap {
        mous_id: String,
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Set the column split reads from; omit to fall back to `data`
    SetDatacolumn { mous_id: String, datacolumn: Option<String> },
    /// Scan every unit and start every eligible stage
    Monitor {
        /// Keep scanning every <secs> seconds until interrupted.
        /// SIGUSR1 pauses the scans, SIGUSR2 resumes them.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Run one stage for one unit in the foreground
    RunStage {
        stage: Stage,
        mous_id: String,
        /// Skip the confirmation prompt for destructive stages
        #[arg(long)]
        yes: bool,
    },
    /// Put a failed column back into the pipeline
    Requeue {
        mous_id: String,
        column: StatusColumn,
        /// Label to reset to (defaults to the column's pending label)
        #[arg(long)]
        to: Option<String>,
    },
    /// Per-column status counts
    Status {
        /// Also list every unit
        #[arg(long)]
        units: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .format_module_path(true)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error [{}]: {}", e.code(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(db_path) = cli.db_path {
        config = config.with_db_path(db_path);
    }
    let config = Arc::new(config);
    info!("Using database {}", config.db_path.display());

    let pool = open_pool(&config.db_path).await?;
    let repo = Arc::new(PipelineStateRepository::new(Arc::new(pool)));

    match cli.command {
        Command::Init => {
            println!("Schema ready at {}", config.db_path.display());
            Ok(())
        }
        Command::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let units: Vec<UnitImport> = serde_json::from_str(&content)?;
            if cli.dry_run {
                for unit in &units {
                    MousId::parse(&unit.mous_id)?;
                }
                println!("[dry-run] Would import {} units from {}", units.len(), file.display());
                return Ok(());
            }
            let added = repo.register_units(&units).await?;
            println!("Imported {} new units ({} already present)", added, units.len() - added);
            Ok(())
        }
        Command::SetUrl { mous_id, url } => {
            let mous_id = MousId::parse(&mous_id)?;
            if cli.dry_run {
                println!("[dry-run] Would set download URL of {} to {}", mous_id, url);
                return Ok(());
            }
            repo.set_download_url(&mous_id, &url).await?;
            println!("Download URL of {} set", mous_id);
            Ok(())
        }
        Command::AddRemap { mous_id, entries } => {
            let mous_id = MousId::parse(&mous_id)?;
            let additions = parse_remap_entries(&entries)?;
            let mut remap = repo.get_spw_remap(&mous_id).await?.unwrap_or_default();
            remap.extend(additions);
            if cli.dry_run {
                println!("[dry-run] Would store remap {:?} for {}", remap, mous_id);
                return Ok(());
            }
            repo.set_spw_remap(&mous_id, &remap).await?;
            println!("Remap for {} is now {:?}", mous_id, remap);
            Ok(())
        }
        Command::SetDatacolumn { mous_id, datacolumn } => {
            let mous_id = MousId::parse(&mous_id)?;
            if cli.dry_run {
                println!("[dry-run] Would set preferred datacolumn of {} to {:?}", mous_id, datacolumn);
                return Ok(());
            }
            repo.set_preferred_datacolumn(&mous_id, datacolumn.as_deref()).await?;
            println!("Preferred datacolumn of {} updated", mous_id);
            Ok(())
        }
        Command::Monitor { watch } => {
            let dispatcher = Arc::new(build_dispatcher(Arc::clone(&config), Arc::clone(&repo)).await?);
            match watch {
                None => {
                    let report = dispatcher.scan(cli.dry_run).await?;
                    for decision in &report.decisions {
                        let verb = if decision.triggered { "started" } else { "would start" };
                        println!("{} {} {}", decision.mous_id, verb, decision.stage);
                    }
                    for attempt in &report.expired {
                        println!("{} {} expired (in_progress since {})", attempt.mous_id, attempt.column, attempt.started_at);
                    }
                    let mut failures = 0;
                    for run in report.wait().await {
                        match run.result {
                            Ok(_) => println!("{} {} finished", run.mous_id, run.stage),
                            Err(e) if e.is_precondition() => println!("{} {} skipped: {}", run.mous_id, run.stage, e),
                            Err(e) => {
                                failures += 1;
                                println!("{} {} failed: {}", run.mous_id, run.stage, e);
                            }
                        }
                    }
                    if failures > 0 {
                        return Err(AppError::InternalError(format!("{} stage executions failed", failures)));
                    }
                    Ok(())
                }
                Some(secs) => {
                    let scheduler = PipelineScheduler::new(dispatcher, Duration::from_secs(secs.max(1)), cli.dry_run);
                    scheduler.start().await?;
                    watch_signals(&scheduler).await?;
                    info!(
                        "Interrupted after {} scans ({:?})",
                        scheduler.scan_count().await,
                        scheduler.get_state().await
                    );
                    scheduler.shutdown().await
                }
            }
        }
        Command::RunStage { stage, mous_id, yes } => {
            let mous_id = MousId::parse(&mous_id)?;
            let record = repo.get_record(&mous_id).await?;
            check_stage(stage, &record)?;

            if stage.is_destructive() {
                if let Some(preview) = cleanup_selfcal_dir(&config, &mous_id, &record, true).await? {
                    println!("{} for {} will delete {} entries:", stage, mous_id, preview.removed.len());
                    for path in &preview.removed {
                        println!("  {}", path.display());
                    }
                    println!("and keep {} entries.", preview.kept.len());
                }
            }

            if cli.dry_run {
                println!("[dry-run] {} is eligible for {}", mous_id, stage);
                return Ok(());
            }
            if stage.is_destructive() && !yes && !confirm("Proceed?")? {
                println!("Aborted.");
                return Ok(());
            }

            let dispatcher = build_dispatcher(Arc::clone(&config), Arc::clone(&repo)).await?;
            let outcome = dispatcher.run_stage(stage, &mous_id).await?;
            println!(
                "{} {} -> {}{}",
                mous_id,
                stage,
                stage.success_label(),
                outcome.notes.map(|n| format!(" ({})", n)).unwrap_or_default()
            );
            Ok(())
        }
        Command::Requeue { mous_id, column, to } => {
            let mous_id = MousId::parse(&mous_id)?;
            if cli.dry_run {
                let current = repo.get_raw_status(&mous_id, column).await?;
                println!("[dry-run] {} {} is {:?}", mous_id, column, current);
                return Ok(());
            }
            if repo.requeue(&mous_id, column, to.as_deref()).await? {
                println!("{} {} requeued", mous_id, column);
            } else {
                println!("{} {} is not in error; nothing changed", mous_id, column);
            }
            Ok(())
        }
        Command::Status { units } => {
            for (column, counts) in repo.status_counts().await? {
                let summary: Vec<String> = counts.iter().map(|(label, n)| format!("{}={}", label, n)).collect();
                println!("{:<28} {}", column.status_column(), summary.join(" "));
            }
            if units {
                for record in repo.list_records().await? {
                    let labels: Vec<&str> = StatusColumn::ALL
                        .into_iter()
                        .map(|c| record.status_label(c).unwrap_or("missing"))
                        .collect();
                    println!("{:<32} {}", record.mous_id, labels.join(" "));
                }
            }
            Ok(())
        }
    }
}

async fn build_dispatcher(config: Arc<PipelineConfig>, repo: Arc<PipelineStateRepository>) -> AppResult<PipelineDispatcher> {
    let session_client: Arc<dyn SessionClient> = Arc::new(HttpSessionClient::new(
        &config.session_api_url,
        config.session_api_token.clone(),
    )?);
    let fetcher: Arc<dyn ArchiveFetcher> = match config.archive_fetcher {
        FetcherKind::Session => Arc::new(SessionArchiveFetcher::new(Arc::clone(&session_client), Arc::clone(&config))),
        FetcherKind::Wget2 => Arc::new(Wget2Fetcher::new(config.tolerated_fetch_codes.clone())),
    };

    let ctx = Arc::new(StageContext::new(config, repo, session_client, fetcher));
    let registry = Arc::new(StageRegistry::with_default_processors().await);
    Ok(PipelineDispatcher::new(ctx, registry))
}

/// Block until ctrl-c, pausing and resuming the scheduler on SIGUSR1 / SIGUSR2.
#[cfg(unix)]
async fn watch_signals(scheduler: &PipelineScheduler) -> AppResult<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut pause = signal(SignalKind::user_defined1())?;
    let mut resume = signal(SignalKind::user_defined2())?;
    loop {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => return Ok(interrupted?),
            _ = pause.recv() => scheduler.pause().await?,
            _ = resume.recv() => scheduler.resume().await?,
        }
    }
}

#[cfg(not(unix))]
async fn watch_signals(_scheduler: &PipelineScheduler) -> AppResult<()> {
    Ok(tokio::signal::ctrl_c().await?)
}

fn parse_remap_entries(entries: &[String]) -> AppResult<SpwRemap> {
    entries
        .iter()
        .map(|entry| {
            let (raw, mapped) = entry
                .split_once(':')
                .ok_or_else(|| AppError::MalformedRemap(format!("expected <raw>:<mapped>, got '{}'", entry)))?;
            let parse = |s: &str| {
                s.trim()
                    .parse::<i32>()
                    .map_err(|e| AppError::MalformedRemap(format!("'{}' in '{}': {}", s, entry, e)))
            };
            Ok((parse(raw)?, parse(mapped)?))
        })
        .collect()
}

fn confirm(prompt: &str) -> AppResult<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
