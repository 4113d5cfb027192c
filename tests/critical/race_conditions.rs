//! Many recordings sharing one listing view, and concurrent ledger updates.

use std::sync::Arc;
use std::time::Duration;

use harvester_core::{CollectionJob, Coordinator, HarvestConfig, Ledger, RunOutcome};
use tempfile::TempDir;

use crate::support::{MockExtractor, MockNavigator, MockPage, fast_config, fragment};

const LISTING: &str = "https://lms.example/course/42";

#[tokio::test]
async fn p0_popup_items_on_one_listing_all_succeed() {
    let dir = TempDir::new().expect("temp dir");
    let mut links = Vec::new();
    let mut navigator = MockNavigator::new().with_download_delay(Duration::from_millis(10));
    let mut fragments = Vec::new();
    for index in 1..=8_u32 {
        let popup = format!("https://lms.example/popup/{index}");
        let href = format!("javascript:open({index})");
        navigator = navigator.with_page(&popup, MockPage::Ready(format!("rec {index}").into_bytes()));
        links.push((href.clone(), popup));
        fragments.push(fragment(&href, index, 0));
    }
    let navigator = Arc::new(navigator.with_page(LISTING, MockPage::Listing(links)));
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));
    let config = HarvestConfig {
        fetch_concurrency: 4,
        ..fast_config()
    };
    let coordinator = Coordinator::new(
        config,
        navigator.clone(),
        Arc::new(MockExtractor::new()),
        Arc::clone(&ledger),
    )
    .expect("coordinator");
    let job = CollectionJob::new("c", dir.path().join("dl"), dir.path().join("ex"), fragments)
        .with_listing_url(LISTING);

    let summary = coordinator.run(vec![job]).await.expect("run");

    assert_eq!(summary.outcome(), RunOutcome::Success);
    assert_eq!(summary.succeeded(), 8);
    assert_eq!(navigator.navigations_to(LISTING), 1, "listing view is shared");
    assert_eq!(navigator.open_views(), 0, "run closes every view");
    for index in 1..=8_u32 {
        let media = dir.path().join("ex").join(format!("{index:02}_1402-07-14_{index:02}-00.mp4"));
        assert_eq!(
            std::fs::read(&media).expect("media"),
            format!("rec {index}").into_bytes(),
            "item {index} got another item's bytes"
        );
    }
    assert_eq!(ledger.entry("c").await.expect("entry").media.len(), 8);
}

#[tokio::test]
async fn p0_same_name_marked_concurrently_grows_set_once() {
    let dir = TempDir::new().expect("temp dir");
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.mark_media_produced("c", "01.mp4").await.expect("mark")
        }));
    }
    let mut grew = 0;
    for handle in handles {
        if handle.await.expect("join") {
            grew += 1;
        }
    }

    assert_eq!(grew, 1);
    assert_eq!(ledger.entry("c").await.expect("entry").media.len(), 1);
}

#[tokio::test]
async fn p0_metadata_pool_of_one_still_finishes_all_collections() {
    let dir = TempDir::new().expect("temp dir");
    let mut navigator = MockNavigator::new();
    let mut jobs = Vec::new();
    for collection in 0..5 {
        let page = format!("https://lms.example/c{collection}/rec/1");
        navigator = navigator.with_page(&page, MockPage::Ready(vec![collection]));
        jobs.push(CollectionJob::new(
            format!("c{collection}"),
            dir.path().join("dl").join(collection.to_string()),
            dir.path().join("ex").join(collection.to_string()),
            vec![fragment(&page, 8, 0)],
        ));
    }
    let ledger = Arc::new(Ledger::load(dir.path().join("l.json")).await.expect("load"));
    let config = HarvestConfig {
        metadata_concurrency: 1,
        fetch_concurrency: 1,
        ..fast_config()
    };
    let coordinator = Coordinator::new(
        config,
        Arc::new(navigator),
        Arc::new(MockExtractor::new()),
        Arc::clone(&ledger),
    )
    .expect("coordinator");

    let summary = coordinator.run(jobs).await.expect("run");

    assert_eq!(summary.succeeded(), 5);
    assert_eq!(ledger.snapshot().await.len(), 5);
}
