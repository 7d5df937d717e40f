//! Resume behaviour of the export scheduler

use super::support::{call_label, date, fast_registry, Inject, ScriptedFetcher};
use coinalyze_exporter::downloader::{ExportError, ExportRequest, ExportScheduler, FailedUnitPolicy};
use coinalyze_exporter::fetcher::NormalizedPayload;
use coinalyze_exporter::output::{SnapshotPack, SnapshotSink};
use coinalyze_exporter::resume::{CompletionStore, UnitStatus};
use coinalyze_exporter::shutdown::{ShutdownCoordinator, SharedShutdown};
use coinalyze_exporter::{Interval, UnitKey};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

const SYMBOL: &str = "BTCUSDT_PERP.A";

fn request() -> ExportRequest {
    ExportRequest::new(
        vec![SYMBOL.parse().unwrap()],
        vec![Interval::OneHour],
        date(2024, 1, 1),
        Some(date(2024, 1, 2)),
        vec!["oi".to_string(), "fr".to_string()],
    )
    .unwrap()
}

fn key(day: u32, category: &str) -> UnitKey {
    UnitKey::new(
        SYMBOL.parse().unwrap(),
        Interval::OneHour,
        date(2024, 1, day),
        category,
    )
}

fn scheduler(
    fetcher: ScriptedFetcher,
    dir: &Path,
    shutdown: SharedShutdown,
) -> ExportScheduler<ScriptedFetcher> {
    ExportScheduler::new(
        fetcher,
        SnapshotSink::new(dir.join("data")),
        dir.join("state"),
        fast_registry(),
    )
    .with_shutdown(shutdown)
}

#[tokio::test]
async fn test_completed_store_means_no_fetches() {
    let dir = TempDir::new().unwrap();
    let mut store = CompletionStore::open(dir.path().join("state")).unwrap();
    for day in [1, 2] {
        for category in ["oi", "fr"] {
            store.set(&key(day, category), UnitStatus::Ok).unwrap();
        }
    }

    let fetcher = ScriptedFetcher::new();
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.done, 0);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_refetching() {
    let dir = TempDir::new().unwrap();

    let shutdown = ShutdownCoordinator::shared();
    let fetcher = ScriptedFetcher::new()
        .with(Inject::ShutdownOnCall(2))
        .with_shutdown(shutdown.clone());
    let first = scheduler(fetcher.clone(), dir.path(), shutdown)
        .run(&request())
        .await
        .unwrap();

    assert!(first.cancelled);
    assert_eq!(first.done, 2);
    assert_eq!(
        fetcher.recorded(),
        vec![
            call_label(SYMBOL, Interval::OneHour, date(2024, 1, 1), "oi"),
            call_label(SYMBOL, Interval::OneHour, date(2024, 1, 1), "fr"),
        ]
    );

    let fetcher = ScriptedFetcher::new();
    let second = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert!(!second.cancelled);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.done, 2);
    assert_eq!(
        fetcher.recorded(),
        vec![
            call_label(SYMBOL, Interval::OneHour, date(2024, 1, 2), "oi"),
            call_label(SYMBOL, Interval::OneHour, date(2024, 1, 2), "fr"),
        ]
    );
}

#[tokio::test]
async fn test_failed_day_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new().with(Inject::FailDay(date(2024, 1, 1)));
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.done, 2);
    assert_eq!(fetcher.call_count(), 4);

    let mut store = CompletionStore::open(dir.path().join("state")).unwrap();
    let failed = store.get(&key(1, "oi")).unwrap().unwrap().status;
    assert!(failed.reason().unwrap().contains("retries exhausted"));
    assert!(store.get(&key(2, "oi")).unwrap().unwrap().status.is_ok());
}

#[tokio::test]
async fn test_failed_units_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    scheduler(
        ScriptedFetcher::new().with(Inject::FailAll),
        dir.path(),
        ShutdownCoordinator::shared(),
    )
    .run(&request())
    .await
    .unwrap();

    let fetcher = ScriptedFetcher::new();
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 4);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_retry_policy_refetches_failed_units_only() {
    let dir = TempDir::new().unwrap();
    scheduler(
        ScriptedFetcher::new().with(Inject::FailDay(date(2024, 1, 2))),
        dir.path(),
        ShutdownCoordinator::shared(),
    )
    .run(&request())
    .await
    .unwrap();

    let fetcher = ScriptedFetcher::new();
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .with_failed_policy(FailedUnitPolicy::Retry)
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.done, 2);
    assert_eq!(fetcher.call_count(), 2);

    let mut store = CompletionStore::open(dir.path().join("state")).unwrap();
    assert!(store.get(&key(2, "fr")).unwrap().unwrap().status.is_ok());
}

#[tokio::test]
async fn test_existing_artifacts_heal_missing_state() {
    let dir = TempDir::new().unwrap();
    let sink = SnapshotSink::new(dir.path().join("data"));
    let existing = key(1, "oi");
    let pack = SnapshotPack::new(&existing, NormalizedPayload::new(vec![json!({"t": 0})]));
    sink.write_unit(&existing, &pack).unwrap();
    sink.append_stream(&existing, &pack).unwrap();

    let fetcher = ScriptedFetcher::new();
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.done, 3);
    assert!(!fetcher
        .recorded()
        .contains(&call_label(SYMBOL, Interval::OneHour, date(2024, 1, 1), "oi")));

    let mut store = CompletionStore::open(dir.path().join("state")).unwrap();
    assert!(store.get(&existing).unwrap().unwrap().status.is_ok());
}

#[tokio::test]
async fn test_snapshot_without_stream_is_refetched() {
    let dir = TempDir::new().unwrap();
    let sink = SnapshotSink::new(dir.path().join("data"));
    let partial = key(1, "oi");
    let pack = SnapshotPack::new(&partial, NormalizedPayload::new(vec![json!({"t": 0})]));
    sink.write_unit(&partial, &pack).unwrap();

    let fetcher = ScriptedFetcher::new();
    let summary = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();

    assert_eq!(summary.done, 4);
    assert_eq!(summary.skipped, 0);
    assert!(fetcher
        .recorded()
        .contains(&call_label(SYMBOL, Interval::OneHour, date(2024, 1, 1), "oi")));
    let stream = std::fs::read_to_string(sink.paths(&partial).stream()).unwrap();
    assert_eq!(stream.lines().count(), 1);
}

#[tokio::test]
async fn test_failed_stream_append_is_retried_not_healed() {
    let dir = TempDir::new().unwrap();
    let sink = SnapshotSink::new(dir.path().join("data"));
    let blocked = key(1, "oi");
    // A directory where the stream file belongs makes the append fail
    std::fs::create_dir_all(sink.paths(&blocked).stream()).unwrap();

    let first = scheduler(ScriptedFetcher::new(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await
        .unwrap();
    assert_eq!(first.failed, 1);
    assert!(first.failures[0].reason.starts_with("local io"));
    assert!(!sink.paths(&blocked).snapshot().exists());

    std::fs::remove_dir(sink.paths(&blocked).stream()).unwrap();

    let fetcher = ScriptedFetcher::new();
    let second = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .with_failed_policy(FailedUnitPolicy::Retry)
        .run(&request())
        .await
        .unwrap();

    assert_eq!(second.done, 1);
    assert_eq!(second.skipped, 3);
    assert_eq!(
        fetcher.recorded(),
        vec![call_label(SYMBOL, Interval::OneHour, date(2024, 1, 1), "oi")]
    );
    assert!(sink.has_unit(&blocked));

    let mut store = CompletionStore::open(dir.path().join("state")).unwrap();
    assert!(store.get(&blocked).unwrap().unwrap().status.is_ok());
}

#[tokio::test]
async fn test_corrupt_ledger_aborts_before_fetching() {
    let dir = TempDir::new().unwrap();
    let ledger_dir = dir.path().join("state").join(SYMBOL);
    std::fs::create_dir_all(&ledger_dir).unwrap();
    std::fs::write(ledger_dir.join("1hour.json"), "{ not json").unwrap();

    let fetcher = ScriptedFetcher::new();
    let result = scheduler(fetcher.clone(), dir.path(), ShutdownCoordinator::shared())
        .run(&request())
        .await;

    assert!(matches!(result, Err(ExportError::State(_))), "{result:?}");
    assert_eq!(fetcher.call_count(), 0);
}
