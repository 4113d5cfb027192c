//! Damaged ledger documents and leftovers in the collection folders.

use std::sync::Arc;

use harvester_core::{CollectionJob, Coordinator, ItemState, Ledger, LedgerError, RunOutcome};
use tempfile::TempDir;

use crate::support::{MockExtractor, MockNavigator, MockPage, fast_config, fragment};

const PAGE: &str = "https://lms.example/rec/1";

async fn load_err(contents: &str) -> LedgerError {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("downloaded.json");
    std::fs::write(&path, contents).expect("write ledger");
    Ledger::load(&path).await.expect_err("ledger should be rejected")
}

#[tokio::test]
async fn p0_truncated_ledger_is_corrupt() {
    let err = load_err(r#"{"c": {"archives": ["a.rar"], "med"#).await;
    assert!(matches!(err, LedgerError::Corrupt { .. }));
}

#[tokio::test]
async fn p0_ledger_with_array_root_is_corrupt() {
    let err = load_err(r#"["a.mp4"]"#).await;
    assert!(matches!(err, LedgerError::Corrupt { .. }));
}

#[tokio::test]
async fn p0_ledger_with_scalar_entry_is_corrupt() {
    let err = load_err(r#"{"c": 5}"#).await;
    assert!(matches!(err, LedgerError::Corrupt { .. }));
}

#[tokio::test]
async fn p0_whitespace_only_ledger_loads_empty() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("downloaded.json");
    std::fs::write(&path, "  \n").expect("write ledger");

    let ledger = Ledger::load(&path).await.expect("load");
    assert!(ledger.snapshot().await.is_empty());
}

#[tokio::test]
async fn p0_unrecorded_partial_archive_is_refetched() {
    let dir = TempDir::new().expect("temp dir");
    let job = CollectionJob::new(
        "c",
        dir.path().join("dl"),
        dir.path().join("ex"),
        vec![fragment(PAGE, 8, 0)],
    );
    std::fs::create_dir_all(&job.download_dir).expect("mkdir");
    std::fs::write(job.download_dir.join("01_1402-07-14_08-00.rar"), b"trunc").expect("write partial");

    let navigator = Arc::new(MockNavigator::new().with_page(PAGE, MockPage::Ready(b"complete".to_vec())));
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));
    let coordinator = Coordinator::new(
        fast_config(),
        navigator.clone(),
        Arc::new(MockExtractor::new()),
        Arc::clone(&ledger),
    )
    .expect("coordinator");

    let summary = coordinator.run(vec![job]).await.expect("run");

    assert_eq!(summary.outcome(), RunOutcome::Success);
    assert_eq!(navigator.navigations_to(PAGE), 1);
    let media = dir.path().join("ex").join("01_1402-07-14_08-00.mp4");
    assert_eq!(std::fs::read(media).expect("media"), b"complete");
}

#[tokio::test]
async fn p0_stale_extraction_scratch_does_not_block_extraction() {
    let dir = TempDir::new().expect("temp dir");
    let extract_dir = dir.path().join("ex");
    std::fs::create_dir_all(extract_dir.join(".extract-stale")).expect("mkdir");
    std::fs::write(extract_dir.join(".extract-stale").join("video.mp4"), b"old").expect("write");

    let navigator = Arc::new(MockNavigator::new().with_page(PAGE, MockPage::Ready(b"new".to_vec())));
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));
    let coordinator = Coordinator::new(
        fast_config(),
        navigator,
        Arc::new(MockExtractor::new()),
        ledger,
    )
    .expect("coordinator");
    let job = CollectionJob::new("c", dir.path().join("dl"), extract_dir.clone(), vec![fragment(PAGE, 8, 0)]);

    let summary = coordinator.run(vec![job]).await.expect("run");

    assert_eq!(summary.collections[0].items[0].state(), ItemState::Done);
    assert_eq!(
        std::fs::read(extract_dir.join("01_1402-07-14_08-00.mp4")).expect("media"),
        b"new"
    );
}

#[tokio::test]
async fn p0_archive_without_media_is_extraction_failure() {
    let dir = TempDir::new().expect("temp dir");
    let navigator = Arc::new(MockNavigator::new().with_page(PAGE, MockPage::Ready(b"x".to_vec())));
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));
    let coordinator = Coordinator::new(
        fast_config(),
        navigator,
        Arc::new(MockExtractor::producing("notes.txt")),
        Arc::clone(&ledger),
    )
    .expect("coordinator");
    let job = CollectionJob::new("c", dir.path().join("dl"), dir.path().join("ex"), vec![fragment(PAGE, 8, 0)]);

    let summary = coordinator.run(vec![job]).await.expect("run");

    let failure = summary.failures().next().expect("one failure");
    assert_eq!(failure.failure_kind(), Some(harvester_core::FailureKind::NoMedia));
    assert!(ledger.is_archive_fetched("c", "01_1402-07-14_08-00.rar").await);
    assert!(!ledger.is_media_produced("c", "01_1402-07-14_08-00.mp4").await);
}
