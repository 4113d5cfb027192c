//! Runs interrupted between a filesystem change and the matching ledger
//! write, and leftovers from an interrupted ledger write.

use std::sync::Arc;

use harvester_core::coordinator::{ItemResult, SkipReason};
use harvester_core::{CollectionJob, Coordinator, Ledger, RunOutcome};
use tempfile::TempDir;

use crate::support::{MockExtractor, MockNavigator, MockPage, fast_config, fragment};

const PAGE: &str = "https://lms.example/rec/1";
const ARCHIVE: &str = "01_1402-07-14_08-00.rar";
const MEDIA: &str = "01_1402-07-14_08-00.mp4";

struct Scene {
    dir: TempDir,
    navigator: Arc<MockNavigator>,
    extractor: Arc<MockExtractor>,
}

impl Scene {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            navigator: Arc::new(MockNavigator::new().with_page(PAGE, MockPage::Ready(b"bytes".to_vec()))),
            extractor: Arc::new(MockExtractor::new()),
        }
    }

    fn job(&self) -> CollectionJob {
        CollectionJob::new(
            "c",
            self.dir.path().join("dl"),
            self.dir.path().join("ex"),
            vec![fragment(PAGE, 8, 0)],
        )
    }

    async fn run(&self) -> (harvester_core::RunSummary, Arc<Ledger>) {
        let ledger = Arc::new(
            Ledger::load(self.dir.path().join("downloaded.json"))
                .await
                .expect("load ledger"),
        );
        let coordinator = Coordinator::new(
            fast_config(),
            self.navigator.clone(),
            self.extractor.clone(),
            Arc::clone(&ledger),
        )
        .expect("coordinator");
        (coordinator.run(vec![self.job()]).await.expect("run"), ledger)
    }
}

#[tokio::test]
async fn p0_leftover_ledger_temp_file_is_ignored() {
    let scene = Scene::new();
    std::fs::write(scene.dir.path().join(".downloaded.json.a1b2"), "{ half").expect("write temp");
    std::fs::write(
        scene.dir.path().join("downloaded.json"),
        format!(r#"{{"c": {{"media": ["{MEDIA}"]}}}}"#),
    )
    .expect("write ledger");

    let (summary, _ledger) = scene.run().await;

    assert!(matches!(
        summary.collections[0].items[0].result,
        ItemResult::Skipped(SkipReason::Recorded)
    ));
    assert_eq!(scene.navigator.navigations_to(PAGE), 0);
}

#[tokio::test]
async fn p0_crash_after_media_before_ledger_write_is_recovered() {
    let scene = Scene::new();
    let extract_dir = scene.dir.path().join("ex");
    std::fs::create_dir_all(&extract_dir).expect("mkdir");
    std::fs::write(extract_dir.join(MEDIA), b"bytes").expect("write media");

    let (summary, ledger) = scene.run().await;

    assert_eq!(summary.outcome(), RunOutcome::Success);
    assert!(ledger.is_media_produced("c", MEDIA).await);
    assert_eq!(scene.extractor.calls(), 0);
    assert_eq!(scene.navigator.navigations_to(PAGE), 0);
}

#[tokio::test]
async fn p0_recorded_archive_missing_on_disk_is_refetched() {
    let scene = Scene::new();
    {
        let ledger = Ledger::load(scene.dir.path().join("downloaded.json"))
            .await
            .expect("load ledger");
        ledger.mark_archive_fetched("c", ARCHIVE).await.expect("mark");
    }

    let (summary, ledger) = scene.run().await;

    assert_eq!(summary.outcome(), RunOutcome::Success);
    assert_eq!(scene.navigator.navigations_to(PAGE), 1);
    assert!(ledger.is_media_produced("c", MEDIA).await);
}

#[tokio::test]
async fn p0_interrupted_run_resumes_without_repeating_work() {
    let scene = Scene::new();
    let (first, _ledger) = scene.run().await;
    assert_eq!(first.succeeded(), 1);

    // Media removed by hand; the ledger still vouches for it.
    std::fs::remove_file(scene.dir.path().join("ex").join(MEDIA)).expect("remove media");

    let (second, _ledger) = scene.run().await;

    assert_eq!(second.skipped(), 1);
    assert_eq!(scene.navigator.navigations_to(PAGE), 1);
    assert_eq!(scene.extractor.calls(), 1);
}
