//! End-to-end engine tests with mock adapters.

use std::path::Path;
use std::time::Duration;

use medley_core::testing::{MockConverter, MockFetcher};
use medley_core::{
    Config, ConverterError, Engine, EngineError, ErrorKind, JobDescriptor, JobId, JobState,
    QueueError, TargetFormat,
};

type MockEngine = Engine<MockFetcher, MockConverter>;

fn test_config(dir: &Path, max_concurrency: usize, max_retries: u32) -> Config {
    let mut config = Config::default();
    config.queue.max_concurrency = max_concurrency;
    config.queue.max_retries = max_retries;
    config.queue.retry_base_delay_ms = 10;
    config.queue.retry_max_delay_ms = 50;
    config.output.output_directory = dir.to_path_buf();
    config.output.per_source_subdirs = false;
    config
}

fn descriptor(n: usize) -> JobDescriptor {
    JobDescriptor::new(format!("https://example.com/v/{}", n), format!("Item {}", n))
}

async fn wait_terminal(engine: &MockEngine, id: JobId, timeout: Duration) -> JobState {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = engine.job(id).expect("job should stay visible");
        if job.state.is_terminal() {
            return job.state;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {:?}",
            id,
            job.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_active(engine: &MockEngine, id: JobId, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = engine.job(id).expect("job should stay visible");
        if matches!(job.state, JobState::Active) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never became active: {:?}",
            id,
            job.state
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn job_runs_through_fetch_and_convert() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::from_millis(20)).await;
    let converter = MockConverter::new();

    let engine = Engine::new(test_config(dir.path(), 2, 3), fetcher, converter);
    engine.start();

    let id = engine
        .submit(descriptor(1).with_format(TargetFormat::Audio))
        .unwrap();
    let state = wait_terminal(&engine, id, Duration::from_secs(5)).await;

    match state {
        JobState::Succeeded { output } => {
            assert_eq!(output, dir.path().join("Item 1.mp3"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    let job = engine.job(id).unwrap();
    assert_eq!(job.attempt, 1);
    assert_eq!(job.progress, 1.0);

    engine.stop();
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::ZERO).await;
    // Fail twice with a transient error, then succeed.
    fetcher
        .fail_times("https://example.com/v/1", 2, ErrorKind::Connection)
        .await;

    let engine = Engine::new(
        test_config(dir.path(), 2, 3),
        fetcher,
        MockConverter::new(),
    );
    engine.start();

    let id = engine.submit(descriptor(1)).unwrap();
    let state = wait_terminal(&engine, id, Duration::from_secs(5)).await;

    assert!(matches!(state, JobState::Succeeded { .. }));
    let job = engine.job(id).unwrap();
    assert_eq!(job.attempt, 3);
    assert_eq!(job.last_error, Some(ErrorKind::Connection));

    engine.stop();
}

#[tokio::test]
async fn permanent_failure_fails_on_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::ZERO).await;
    fetcher
        .fail_times("https://example.com/v/1", 5, ErrorKind::InvalidSource)
        .await;

    let engine = Engine::new(
        test_config(dir.path(), 2, 3),
        fetcher,
        MockConverter::new(),
    );
    engine.start();

    let id = engine.submit(descriptor(1)).unwrap();
    let state = wait_terminal(&engine, id, Duration::from_secs(5)).await;

    assert!(matches!(
        state,
        JobState::Failed {
            error: ErrorKind::InvalidSource
        }
    ));
    let job = engine.job(id).unwrap();
    assert_eq!(job.attempt, 1);

    engine.stop();
}

#[tokio::test]
async fn exhausted_retries_fail_with_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::ZERO).await;
    fetcher
        .fail_times("https://example.com/v/1", 10, ErrorKind::Timeout)
        .await;

    let engine = Engine::new(
        test_config(dir.path(), 2, 2),
        fetcher,
        MockConverter::new(),
    );
    engine.start();

    let id = engine.submit(descriptor(1)).unwrap();
    let state = wait_terminal(&engine, id, Duration::from_secs(5)).await;

    assert!(matches!(
        state,
        JobState::Failed {
            error: ErrorKind::Timeout
        }
    ));
    // max_retries = 2 allows 3 attempts in total.
    assert_eq!(engine.job(id).unwrap().attempt, 3);

    engine.stop();
}

#[tokio::test]
async fn conversion_failure_is_classified_and_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::ZERO).await;
    let converter = MockConverter::new();
    converter
        .set_next_error(ConverterError::conversion_failed("no audio stream", None))
        .await;

    let engine = Engine::new(test_config(dir.path(), 2, 3), fetcher, converter);
    engine.start();

    let id = engine.submit(descriptor(1)).unwrap();
    let state = wait_terminal(&engine, id, Duration::from_secs(5)).await;

    assert!(matches!(
        state,
        JobState::Failed {
            error: ErrorKind::UnsupportedFormat
        }
    ));

    engine.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_cap_holds_and_promotion_is_fifo() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    let probe = fetcher.clone();
    fetcher.set_fetch_duration(Duration::from_millis(300)).await;

    let engine = Engine::new(
        test_config(dir.path(), 10, 3),
        fetcher,
        MockConverter::new(),
    );
    engine.start();

    let ids: Vec<JobId> = (0..15).map(|n| engine.submit(descriptor(n)).unwrap()).collect();

    // All slots fill, the rest stay queued.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let counts = engine.status().counts;
    assert_eq!(counts.active, 10);
    assert_eq!(counts.queued, 5);

    for id in &ids {
        let state = wait_terminal(&engine, *id, Duration::from_secs(10)).await;
        assert!(matches!(state, JobState::Succeeded { .. }));
    }

    // The first ten dispatches are exactly the first ten submissions;
    // the queued five were promoted only after them.
    let dispatched: Vec<JobId> = probe
        .recorded_requests()
        .await
        .iter()
        .map(|r| r.job_id)
        .collect();
    assert_eq!(dispatched.len(), 15);
    let mut head: Vec<String> = dispatched[..10].iter().map(|id| id.to_string()).collect();
    let mut expected_head: Vec<String> = ids[..10].iter().map(|id| id.to_string()).collect();
    head.sort();
    expected_head.sort();
    assert_eq!(head, expected_head);

    assert_eq!(engine.snapshot().summary.succeeded, 15);

    engine.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_order_follows_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    let probe = fetcher.clone();
    fetcher.set_fetch_duration(Duration::from_millis(50)).await;

    let engine = Engine::new(test_config(dir.path(), 2, 3), fetcher, MockConverter::new());

    // Submit before starting so the dispatch order is not racing the
    // submission loop.
    let ids: Vec<JobId> = (0..6).map(|n| engine.submit(descriptor(n)).unwrap()).collect();
    engine.start();

    for id in &ids {
        let state = wait_terminal(&engine, *id, Duration::from_secs(5)).await;
        assert!(matches!(state, JobState::Succeeded { .. }));
    }

    engine.stop();

    // The queue hands jobs out strictly in insertion order; only the
    // post-dequeue recording can race, and at most within the two
    // concurrently running slots. Bounded displacement captures that.
    let dispatched: Vec<JobId> = probe
        .recorded_requests()
        .await
        .iter()
        .map(|r| r.job_id)
        .collect();
    assert_eq!(dispatched.len(), 6);
    for (submit_idx, id) in ids.iter().enumerate() {
        let dispatch_idx = dispatched.iter().position(|d| d == id).unwrap();
        assert!(
            submit_idx.abs_diff(dispatch_idx) < 2,
            "job {} submitted at {} but dispatched at {}",
            id,
            submit_idx,
            dispatch_idx
        );
    }
}

#[tokio::test]
async fn cancelling_a_queued_job_is_immediate() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::from_millis(300)).await;

    let engine = Engine::new(test_config(dir.path(), 1, 3), fetcher, MockConverter::new());
    engine.start();

    let first = engine.submit(descriptor(0)).unwrap();
    let second = engine.submit(descriptor(1)).unwrap();

    wait_active(&engine, first, Duration::from_secs(2)).await;
    engine.cancel(second).unwrap();
    assert_eq!(engine.job(second).unwrap().state, JobState::Cancelled);

    // The running job is unaffected.
    let state = wait_terminal(&engine, first, Duration::from_secs(5)).await;
    assert!(matches!(state, JobState::Succeeded { .. }));

    engine.stop();
}

#[tokio::test]
async fn cancelling_an_active_job_aborts_cooperatively() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::from_millis(500)).await;

    let engine = Engine::new(test_config(dir.path(), 2, 3), fetcher, MockConverter::new());
    engine.start();

    let doomed = engine.submit(descriptor(0)).unwrap();
    let bystander = engine.submit(descriptor(1)).unwrap();

    wait_active(&engine, doomed, Duration::from_secs(2)).await;
    engine.cancel(doomed).unwrap();

    let state = wait_terminal(&engine, doomed, Duration::from_secs(5)).await;
    assert_eq!(state, JobState::Cancelled);

    // No partial output is left behind for the cancelled job.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(&doomed.to_string()))
        .collect();
    assert!(leftovers.is_empty());

    // Other jobs keep their own state.
    let state = wait_terminal(&engine, bystander, Duration::from_secs(5)).await;
    assert!(matches!(state, JobState::Succeeded { .. }));

    engine.stop();
}

#[tokio::test]
async fn clear_removes_pending_and_terminal_but_not_active() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::from_millis(400)).await;
    fetcher
        .fail_times("https://example.com/v/99", 1, ErrorKind::DiskFull)
        .await;

    let engine = Engine::new(test_config(dir.path(), 3, 3), fetcher, MockConverter::new());
    engine.start();

    // One job fails permanently first.
    let failed = engine
        .submit(JobDescriptor::new("https://example.com/v/99", "Doomed"))
        .unwrap();
    wait_terminal(&engine, failed, Duration::from_secs(5)).await;

    // Two long-running jobs occupy slots; three more wait behind them.
    let active_a = engine.submit(descriptor(0)).unwrap();
    let active_b = engine.submit(descriptor(1)).unwrap();
    wait_active(&engine, active_a, Duration::from_secs(2)).await;
    wait_active(&engine, active_b, Duration::from_secs(2)).await;

    engine.resize(2);
    let queued: Vec<JobId> = (2..5).map(|n| engine.submit(descriptor(n)).unwrap()).collect();

    // 2 active, 3 queued, 1 failed -> clear removes 4.
    let removed = engine.clear();
    assert_eq!(removed, 4);

    let counts = engine.status().counts;
    assert_eq!(counts.active, 2);
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.failed, 0);
    assert!(engine.job(failed).is_none());
    for id in queued {
        assert!(engine.job(id).is_none());
    }

    // The two active jobs run to completion untouched.
    assert!(matches!(
        wait_terminal(&engine, active_a, Duration::from_secs(5)).await,
        JobState::Succeeded { .. }
    ));
    assert!(matches!(
        wait_terminal(&engine, active_b, Duration::from_secs(5)).await,
        JobState::Succeeded { .. }
    ));

    engine.stop();
}

#[tokio::test]
async fn growing_the_pool_dispatches_waiting_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::from_millis(300)).await;

    let engine = Engine::new(test_config(dir.path(), 1, 3), fetcher, MockConverter::new());
    engine.start();

    let first = engine.submit(descriptor(0)).unwrap();
    let second = engine.submit(descriptor(1)).unwrap();
    wait_active(&engine, first, Duration::from_secs(2)).await;
    assert_eq!(engine.job(second).unwrap().state, JobState::Queued);

    engine.resize(2);
    wait_active(&engine, second, Duration::from_secs(2)).await;
    assert_eq!(engine.status().counts.active, 2);

    wait_terminal(&engine, first, Duration::from_secs(5)).await;
    wait_terminal(&engine, second, Duration::from_secs(5)).await;

    engine.stop();
}

#[tokio::test]
async fn invalid_descriptor_is_rejected_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        test_config(dir.path(), 1, 3),
        MockFetcher::new(),
        MockConverter::new(),
    );

    let err = engine
        .submit(JobDescriptor::new("file:///etc/passwd", "nope"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Queue(QueueError::InvalidDescriptor { .. })
    ));
}

#[tokio::test]
async fn saved_job_list_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("queue.json");

    // First engine: three jobs enqueued, never started.
    let engine = Engine::new(
        test_config(dir.path(), 2, 3),
        MockFetcher::new(),
        MockConverter::new(),
    );
    for n in 0..3 {
        engine.submit(descriptor(n)).unwrap();
    }
    let saved = engine.save_queue(&list_path).await.unwrap();
    assert_eq!(saved, 3);

    // Second engine picks the list up explicitly.
    let restored = Engine::new(
        test_config(dir.path(), 2, 3),
        MockFetcher::new(),
        MockConverter::new(),
    );
    let ids = restored.load_queue(&list_path).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(restored.status().counts.queued, 3);
}

#[tokio::test]
async fn succeeded_jobs_are_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("queue.json");

    let fetcher = MockFetcher::new();
    fetcher.set_fetch_duration(Duration::ZERO).await;
    let engine = Engine::new(test_config(dir.path(), 2, 3), fetcher, MockConverter::new());
    engine.start();

    let id = engine.submit(descriptor(0)).unwrap();
    wait_terminal(&engine, id, Duration::from_secs(5)).await;
    engine.stop();

    let saved = engine.save_queue(&list_path).await.unwrap();
    assert_eq!(saved, 0);
}
