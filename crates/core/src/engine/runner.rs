//! Engine implementation: worker pool and per-job pipeline.
//!
//! Worker slots pull from the queue manager, run fetch then convert,
//! and report the classified outcome back. Idle slots suspend on the
//! queue's eligibility notification, bounded by the earliest pending
//! retry, so there is no busy-polling.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::converter::{ConversionJob, Converter, ConverterError};
use crate::fetcher::{FetchError, FetchProgress, FetchRequest, Fetcher};
use crate::job::{Job, JobDescriptor, JobId, JobOutcome};
use crate::metrics;
use crate::output::{sanitize_name, unique_path, OutputLayout};
use crate::progress::{ProgressAggregator, QueueSnapshot};
use crate::queue::{QueueEvent, QueueManager};

use super::types::{EngineError, EngineStatus};

/// Fallback idle sleep when no retry is pending; the eligibility
/// notification is the primary wake signal.
const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// The download engine: a queue manager plus a resizable worker pool.
pub struct Engine<F, C>
where
    F: Fetcher + 'static,
    C: Converter + 'static,
{
    queue: Arc<QueueManager>,
    fetcher: Arc<F>,
    converter: Arc<C>,
    layout: OutputLayout,
    aggregator: ProgressAggregator,
    audio_bitrate_kbps: u32,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    worker_target: watch::Sender<usize>,
    spawned_workers: Mutex<usize>,
}

impl<F, C> Engine<F, C>
where
    F: Fetcher + 'static,
    C: Converter + 'static,
{
    /// Build an engine from configuration and the two adapters.
    pub fn new(config: Config, fetcher: F, converter: C) -> Self {
        let queue = Arc::new(QueueManager::new(
            config.queue.max_concurrency,
            config.queue.retry_policy(),
        ));
        let aggregator = ProgressAggregator::spawn(queue.subscribe());
        let layout = OutputLayout::new(
            config.output.output_directory.clone(),
            config.output.per_source_subdirs,
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let (worker_target, _) = watch::channel(config.queue.max_concurrency.max(1));

        Self {
            queue,
            fetcher: Arc::new(fetcher),
            converter: Arc::new(converter),
            layout,
            aggregator,
            audio_bitrate_kbps: config.converter.audio_bitrate_kbps,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            worker_target,
            spawned_workers: Mutex::new(0),
        }
    }

    /// Start the worker pool.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("engine already running");
            return;
        }

        let target = *self.worker_target.borrow();
        info!(workers = target, "starting engine");

        let mut spawned = self.spawned_workers.lock();
        for index in 0..target {
            self.spawn_worker(index);
        }
        *spawned = target;
    }

    /// Stop the worker pool gracefully.
    ///
    /// In-flight jobs finish their current pipeline stage; idle slots
    /// wake up and exit immediately.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("engine not running");
            return;
        }

        info!("stopping engine");
        let _ = self.shutdown_tx.send(());
    }

    /// Submit a job descriptor; returns the assigned job id.
    pub fn submit(&self, descriptor: JobDescriptor) -> Result<JobId, EngineError> {
        let destination = self.layout.resolve(descriptor.collection.as_deref())?;
        Ok(self.queue.add(descriptor, destination)?)
    }

    /// Cancel a job (queued: immediate; active: cooperative).
    pub fn cancel(&self, id: JobId) -> Result<(), EngineError> {
        Ok(self.queue.cancel(id)?)
    }

    /// Remove a job from the queue.
    pub fn remove(&self, id: JobId) -> Result<(), EngineError> {
        Ok(self.queue.remove(id)?)
    }

    /// Remove all non-active jobs; returns the number removed.
    pub fn clear(&self) -> usize {
        self.queue.clear()
    }

    /// Move a queued job within the pending order.
    pub fn reorder(&self, id: JobId, new_index: usize) -> Result<(), EngineError> {
        Ok(self.queue.reorder(id, new_index)?)
    }

    /// Resize the worker pool at runtime.
    ///
    /// Growing spawns additional slots immediately; shrinking lets
    /// excess slots finish their current job and exit.
    pub fn resize(&self, workers: usize) {
        let workers = workers.max(1);
        info!(workers, "resizing worker pool");

        self.queue.set_max_concurrency(workers);

        let mut spawned = self.spawned_workers.lock();
        // send_replace updates the target even when no worker is
        // subscribed yet (resize before start).
        self.worker_target.send_replace(workers);
        if self.running.load(Ordering::SeqCst) && workers > *spawned {
            for index in *spawned..workers {
                self.spawn_worker(index);
            }
        }
        *spawned = workers;
    }

    /// Subscribe to the queue's event stream (display interface).
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    /// Consistent progress snapshot for display layers.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.aggregator.snapshot()
    }

    /// Clone of one job's current record.
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.queue.get(id)
    }

    /// Current engine status.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running.load(Ordering::Relaxed),
            workers: *self.worker_target.borrow(),
            counts: self.queue.counts(),
        }
    }

    /// Write the descriptors of unfinished (and failed) jobs to a JSON
    /// file, so a later run can be fed the same list explicitly.
    pub async fn save_queue(&self, path: &Path) -> Result<usize, EngineError> {
        let descriptors: Vec<JobDescriptor> = self
            .queue
            .jobs()
            .into_iter()
            .filter(|job| {
                !matches!(
                    job.state,
                    crate::job::JobState::Succeeded { .. } | crate::job::JobState::Cancelled
                )
            })
            .map(|job| job.descriptor())
            .collect();

        let json = serde_json::to_vec_pretty(&descriptors)
            .map_err(|e| EngineError::JobList(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| EngineError::JobList(e.to_string()))?;

        info!(count = descriptors.len(), path = %path.display(), "saved job list");
        Ok(descriptors.len())
    }

    /// Submit every descriptor from a saved job list.
    pub async fn load_queue(&self, path: &Path) -> Result<Vec<JobId>, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::JobList(e.to_string()))?;
        let descriptors: Vec<JobDescriptor> =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::JobList(e.to_string()))?;

        info!(count = descriptors.len(), path = %path.display(), "loading job list");
        descriptors
            .into_iter()
            .map(|descriptor| self.submit(descriptor))
            .collect()
    }

    fn spawn_worker(&self, index: usize) {
        let queue = Arc::clone(&self.queue);
        let fetcher = Arc::clone(&self.fetcher);
        let converter = Arc::clone(&self.converter);
        let running = Arc::clone(&self.running);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let target_rx = self.worker_target.subscribe();
        let audio_bitrate_kbps = self.audio_bitrate_kbps;

        tokio::spawn(worker_loop(
            index,
            queue,
            fetcher,
            converter,
            audio_bitrate_kbps,
            running,
            shutdown_rx,
            target_rx,
        ));
    }
}

/// One worker slot: pull, run the pipeline, report, repeat.
#[allow(clippy::too_many_arguments)]
async fn worker_loop<F, C>(
    index: usize,
    queue: Arc<QueueManager>,
    fetcher: Arc<F>,
    converter: Arc<C>,
    audio_bitrate_kbps: u32,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut target_rx: watch::Receiver<usize>,
) where
    F: Fetcher + 'static,
    C: Converter + 'static,
{
    debug!(worker = index, "worker slot started");

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if *target_rx.borrow() <= index {
            debug!(worker = index, "worker slot drained by resize");
            break;
        }

        // Register interest before checking the queue, so a job added
        // between the check and the await cannot be missed.
        let notified = queue.dispatch_notify().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some((job, cancel)) = queue.dequeue_next() {
            run_job(
                &queue,
                fetcher.as_ref(),
                converter.as_ref(),
                audio_bitrate_kbps,
                job,
                cancel,
            )
            .await;
            continue;
        }

        let idle_cap = queue.time_until_next_retry().unwrap_or(IDLE_SLEEP);
        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep(idle_cap) => {}
            _ = target_rx.changed() => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    debug!(worker = index, "worker slot stopped");
}

/// Run the fetch -> convert pipeline for one dispatched job.
///
/// Every fetcher/converter failure is caught here, classified, and
/// handed to the queue manager; the worker never decides retry versus
/// give-up itself.
async fn run_job<F, C>(
    queue: &Arc<QueueManager>,
    fetcher: &F,
    converter: &C,
    audio_bitrate_kbps: u32,
    job: Job,
    cancel: CancellationToken,
) where
    F: Fetcher + ?Sized,
    C: Converter + ?Sized,
{
    let job_id = job.id;
    info!(
        job_id = %job_id,
        attempt = job.attempt,
        url = %job.source_url,
        "pipeline started"
    );

    let (progress_tx, mut progress_rx) = mpsc::channel::<FetchProgress>(32);
    let forward_queue = Arc::clone(queue);
    let forwarder = tokio::spawn(async move {
        while let Some(sample) = progress_rx.recv().await {
            forward_queue.report_progress(sample.job_id, sample.fraction, sample.bytes_per_sec);
        }
    });

    let request = FetchRequest {
        job_id,
        source_url: job.source_url.clone(),
        target_format: job.target_format,
        work_dir: job.destination_dir.clone(),
    };

    let fetch_started = Instant::now();
    let fetch_result = fetcher.fetch(request, progress_tx, cancel.clone()).await;
    metrics::FETCH_DURATION.observe(fetch_started.elapsed().as_secs_f64());

    // The fetcher dropped its sender; drain remaining samples so the
    // outcome is reported after the last progress update.
    let _ = forwarder.await;

    let fetched = match fetch_result {
        Ok(path) => path,
        Err(FetchError::Cancelled) => {
            report(queue, job_id, JobOutcome::Cancelled);
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "fetch failed");
            report(
                queue,
                job_id,
                JobOutcome::Failed {
                    kind: e.error_kind(),
                },
            );
            return;
        }
    };

    // Cancellation checkpoint between fetch and convert.
    if cancel.is_cancelled() {
        remove_quietly(&fetched).await;
        report(queue, job_id, JobOutcome::Cancelled);
        return;
    }

    let stem = sanitize_name(&job.title);
    let output_path = unique_path(
        &job.destination_dir,
        &stem,
        job.target_format.extension(),
    );

    let conversion = ConversionJob {
        job_id,
        input_path: fetched.clone(),
        target_format: job.target_format,
        output_path,
        audio_bitrate_kbps,
    };

    let convert_started = Instant::now();
    let convert_result = converter.convert(conversion).await;
    metrics::CONVERSION_DURATION.observe(convert_started.elapsed().as_secs_f64());

    remove_quietly(&fetched).await;

    match convert_result {
        Ok(result) => {
            report(
                queue,
                job_id,
                JobOutcome::Completed {
                    output: result.output_path,
                },
            );
        }
        Err(ConverterError::Cancelled) => report(queue, job_id, JobOutcome::Cancelled),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "conversion failed");
            report(
                queue,
                job_id,
                JobOutcome::Failed {
                    kind: e.error_kind(),
                },
            );
        }
    }
}

fn report(queue: &QueueManager, id: JobId, outcome: JobOutcome) {
    if let Err(e) = queue.report_outcome(id, outcome) {
        warn!(job_id = %id, error = %e, "failed to report job outcome");
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "could not remove intermediate file");
        }
    }
}
