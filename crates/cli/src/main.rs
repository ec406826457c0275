//! medley: headless driver for the download queue engine.
//!
//! Enqueues the given URLs, consumes the queue's event stream as a
//! pure display consumer, and exits once every job has reached a
//! terminal state.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medley_core::{
    load_config, validate_config, Config, Engine, FfmpegConverter, HttpFetcher, JobDescriptor,
    JobId, JobState, QueueEvent, TargetFormat,
};

#[derive(Debug, Parser)]
#[command(
    name = "medley",
    version,
    about = "Bounded-concurrency media download and conversion queue"
)]
struct Args {
    /// Source URLs to enqueue.
    urls: Vec<String>,

    /// Path to the configuration file (defaults to ./medley.toml when
    /// present).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Download audio (mp3) instead of video (mp4).
    #[arg(long)]
    audio: bool,

    /// Override the worker pool size.
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Override the output directory.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Collection name; its items share an output subdirectory.
    #[arg(long, value_name = "NAME")]
    collection: Option<String>,

    /// Load a previously saved job list before the URL arguments.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Save unfinished jobs to this file on exit.
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = load_configuration(&args)?;

    if let Some(concurrency) = args.concurrency {
        config.queue.max_concurrency = concurrency;
    }
    if let Some(ref dir) = args.output_dir {
        config.output.output_directory = dir.clone();
    }
    validate_config(&config).context("configuration validation failed")?;

    let format = if args.audio {
        TargetFormat::Audio
    } else {
        config.queue.output_format
    };

    let fetcher = HttpFetcher::new(config.fetcher.clone()).context("failed to build fetcher")?;
    let converter = FfmpegConverter::new(config.converter.clone());
    let engine = Engine::new(config, fetcher, converter);

    // Subscribe before submitting so no transition is missed.
    let mut events = engine.subscribe();
    let mut titles: HashMap<JobId, String> = HashMap::new();

    engine.start();

    if let Some(ref list) = args.load {
        let ids = engine
            .load_queue(list)
            .await
            .with_context(|| format!("failed to load job list from {}", list.display()))?;
        for id in ids {
            if let Some(job) = engine.job(id) {
                titles.insert(id, job.title);
            }
        }
    }

    for url in &args.urls {
        let title = title_from_url(url);
        let mut descriptor = JobDescriptor::new(url, &title).with_format(format);
        if let Some(ref collection) = args.collection {
            descriptor = descriptor.with_collection(collection);
        }
        match engine.submit(descriptor) {
            Ok(id) => {
                titles.insert(id, title);
            }
            Err(e) => warn!(url = %url, error = %e, "skipping URL"),
        }
    }

    if engine.status().counts.unfinished() == 0 {
        info!("nothing to do");
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    display_event(&engine, &titles, event);
                    if engine.status().counts.unfinished() == 0 {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    if let Some(ref path) = args.save {
        let saved = engine
            .save_queue(path)
            .await
            .with_context(|| format!("failed to save job list to {}", path.display()))?;
        info!(count = saved, path = %path.display(), "unfinished jobs saved");
    }

    engine.stop();

    let summary = engine.snapshot().summary;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "finished"
    );

    Ok(())
}

fn load_configuration(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => {
            load_config(path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => {
            let default_path = PathBuf::from("medley.toml");
            if default_path.exists() {
                load_config(&default_path).context("failed to load medley.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn display_event(
    engine: &Engine<HttpFetcher, FfmpegConverter>,
    titles: &HashMap<JobId, String>,
    event: QueueEvent,
) {
    let title_of = |id: &JobId| {
        titles
            .get(id)
            .cloned()
            .or_else(|| engine.job(*id).map(|j| j.title))
            .unwrap_or_else(|| id.to_string())
    };

    match event {
        QueueEvent::StateChanged { job_id, state, .. } => match state {
            JobState::Active => info!("downloading '{}'", title_of(&job_id)),
            JobState::RetryPending { .. } => info!("will retry '{}'", title_of(&job_id)),
            JobState::Succeeded { output } => {
                info!("finished '{}' -> {}", title_of(&job_id), output.display());
            }
            JobState::Failed { error } => {
                warn!("failed '{}' ({})", title_of(&job_id), error);
            }
            JobState::Cancelled => info!("cancelled '{}'", title_of(&job_id)),
            JobState::Queued => {}
        },
        QueueEvent::ProgressUpdated {
            job_id,
            fraction,
            bytes_per_sec,
        } => {
            tracing::debug!(
                job = %title_of(&job_id),
                percent = (fraction * 100.0) as u32,
                bytes_per_sec,
                "progress"
            );
        }
        QueueEvent::Removed { .. } => {}
    }
}

fn title_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}
