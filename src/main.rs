//! CLI entry point for the download manager.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use download_manager::manager::name_from_url;
use download_manager::{
    ActionOutcome, DownloadJob, DownloadManager, JobId, JobStatus, ManagerConfig, Settings,
    SqliteStore, default_database_path, default_settings_path,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

/// Used when the platform reports no data directory.
const FALLBACK_DB_FILE: &str = "downloads.db";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings_path = args.config.clone().or_else(default_settings_path);
    let mut settings = match settings_path.as_deref() {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    // Speed limit only touches settings; no database needed.
    if let Command::SpeedLimit { kbps } = &args.command {
        return speed_limit(&mut settings, settings_path, *kbps);
    }

    let db_path = args
        .db
        .clone()
        .or_else(default_database_path)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DB_FILE));
    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;
    debug!(db = %db_path.display(), "database opened");

    // Only `run` stays alive long enough to finish a transfer. Other commands
    // change state and exit; their started jobs load as paused next time.
    let config = ManagerConfig {
        auto_start_worker: matches!(args.command, Command::Run { .. }),
        ..ManagerConfig::from(&settings)
    };
    let manager = DownloadManager::from_settings_with_config(&settings, config, Arc::new(store))
        .await
        .context("starting download manager")?;

    let result = dispatch(&manager, &settings, args.command, args.quiet).await;
    manager.shutdown().await;
    result
}

async fn dispatch(
    manager: &DownloadManager,
    settings: &Settings,
    command: Command,
    quiet: bool,
) -> Result<()> {
    match command {
        Command::Add { url, dir } => {
            let dir = dir.unwrap_or_else(|| settings.default_save_path.clone());
            let id = manager.add_download(&url, dir).await;
            println!("{id}");
        }
        Command::AddVideo {
            url,
            dir,
            title,
            format,
        } => {
            let dir = dir.unwrap_or_else(|| settings.default_save_path.clone());
            let title = match title {
                Some(title) => title,
                None => probe_title(manager, &url).await,
            };
            let id = manager.add_external_download(&url, dir, &title, &format).await;
            println!("{id}");
        }
        Command::List => print_jobs(&manager.list_all()),
        Command::Start { ids } => report("start", &ids, &manager.start_many(&ids).await)?,
        Command::Pause { ids } => report("pause", &ids, &manager.pause_many(&ids).await)?,
        Command::Resume { ids } => report("resume", &ids, &manager.resume_many(&ids).await)?,
        Command::Cancel { ids } => report("cancel", &ids, &manager.cancel_many(&ids).await)?,
        Command::Delete { ids } => report("delete", &ids, &manager.delete_many(&ids).await)?,
        Command::Run { ids } => run(manager, &ids, quiet).await?,
        Command::Info { url } => {
            let info = manager
                .probe_video(&url)
                .await
                .with_context(|| format!("probing {url}"))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        // Handled before the database is opened.
        Command::SpeedLimit { .. } => {}
    }
    Ok(())
}

fn speed_limit(
    settings: &mut Settings,
    settings_path: Option<PathBuf>,
    kbps: Option<u64>,
) -> Result<()> {
    let Some(kbps) = kbps else {
        match settings.speed_limit_kbps {
            Some(kbps) if kbps > 0 => println!("{kbps} KB/s"),
            _ => println!("unlimited"),
        }
        return Ok(());
    };

    let Some(path) = settings_path else {
        bail!("no settings location available; pass --config");
    };
    settings.speed_limit_kbps = Some(kbps);
    settings
        .save(&path)
        .with_context(|| format!("saving settings to {}", path.display()))?;
    info!(kbps, path = %path.display(), "speed limit saved");
    Ok(())
}

async fn probe_title(manager: &DownloadManager, url: &str) -> String {
    match manager.probe_video(url).await {
        Ok(info) if !info.title.trim().is_empty() => info.title,
        Ok(_) => name_from_url(url),
        Err(error) => {
            warn!(%url, %error, "could not probe title, naming from URL");
            name_from_url(url)
        }
    }
}

fn print_jobs(jobs: &[DownloadJob]) {
    if jobs.is_empty() {
        println!("no downloads");
        return;
    }
    for job in jobs {
        println!(
            "{:>4}  {:<11}  {:>3}%  {:>10}  {:>12}  {}  {}",
            job.id,
            job.status.label(),
            job.progress,
            job.formatted_size(),
            job.formatted_speed(),
            job.name,
            job.url
        );
    }
}

fn report(action: &str, ids: &[JobId], outcomes: &[ActionOutcome]) -> Result<()> {
    let mut rejected = 0_usize;
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            ActionOutcome::Applied => debug!(job_id = id, action, "applied"),
            ActionOutcome::NotFound => {
                rejected += 1;
                eprintln!("{action} {id}: no such download");
            }
            ActionOutcome::InvalidPrecondition { status } => {
                rejected += 1;
                eprintln!("{action} {id}: download is {}", status.label());
            }
        }
    }
    if rejected > 0 {
        bail!("{rejected} of {} {action} request(s) rejected", ids.len());
    }
    Ok(())
}

/// Starts or resumes `ids` (every paused job when empty) and waits until no
/// job is downloading. Ctrl-C pauses whatever is still running.
async fn run(manager: &DownloadManager, ids: &[JobId], quiet: bool) -> Result<()> {
    let targets: Vec<JobId> = if ids.is_empty() {
        manager
            .list_all()
            .iter()
            .filter(|job| job.status == JobStatus::Paused)
            .map(|job| job.id)
            .collect()
    } else {
        ids.to_vec()
    };

    for &id in &targets {
        let outcome = match manager.get_by_id(id).map(|job| job.status) {
            Some(JobStatus::Paused | JobStatus::Failed) => manager.resume(id).await,
            _ => manager.start(id).await,
        };
        report("run", &[id], &[outcome])?;
    }
    if targets.is_empty() {
        info!("nothing to download");
        return Ok(());
    }

    let bar = if quiet || !io::stderr().is_terminal() {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    };

    let mut changes = manager.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let jobs: Vec<DownloadJob> = manager
            .list_all()
            .into_iter()
            .filter(|job| targets.contains(&job.id))
            .collect();
        let running: Vec<&DownloadJob> = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Downloading)
            .collect();
        if running.is_empty() && manager.active_transfers() == 0 {
            break;
        }

        let done = jobs.len() - running.len();
        bar.set_message(match running.first() {
            Some(job) => format!(
                "[{done}/{}] {} {}% {}",
                jobs.len(),
                job.name,
                job.progress,
                job.formatted_speed()
            ),
            None => format!("[{done}/{}] finishing", jobs.len()),
        });

        tokio::select! {
            _ = changes.changed() => {}
            () = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = &mut ctrl_c => {
                bar.finish_and_clear();
                let running: Vec<JobId> = running.iter().map(|job| job.id).collect();
                manager.pause_many(&running).await;
                warn!(paused = running.len(), "interrupted, running downloads paused");
                return Ok(());
            }
        }
    }
    bar.finish_and_clear();

    let jobs: Vec<DownloadJob> = manager
        .list_all()
        .into_iter()
        .filter(|job| targets.contains(&job.id))
        .collect();
    let completed = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Completed)
        .count();
    let failed = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .count();
    info!(completed, failed, total = jobs.len(), "Download run finished");

    if failed > 0 {
        bail!("{failed} download(s) failed");
    }
    Ok(())
}
