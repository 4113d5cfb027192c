//! Shared fakes for integration tests: a scriptable navigator, a counting
//! extractor, and listing fragment builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::extract::ExtractorError;
use harvester_core::navigator::{DownloadPayload, ElementHandle, PageHandle};
use harvester_core::{Extractor, HarvestConfig, NavError, Navigator, Selector};

/// How a scripted page behaves.
#[derive(Debug, Clone)]
pub enum MockPage {
    /// Offers an MP4 link that delivers these bytes.
    Ready(Vec<u8>),
    /// Shows the "still being prepared" marker.
    NotReady,
    /// Loads, but offers nothing to click.
    Empty,
    /// Navigation fails with a transport error.
    Unreachable,
    /// A listing whose links (by exact href) open the given URLs as popups.
    Listing(Vec<(String, String)>),
}

/// Navigator driven by a per-URL script. Counts navigations and open views.
#[derive(Debug, Default)]
pub struct MockNavigator {
    pages: Mutex<HashMap<String, MockPage>>,
    views: Mutex<HashMap<u64, String>>,
    clicked: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    navigations: Mutex<HashMap<String, usize>>,
    max_open: AtomicUsize,
    download_delay: Mutex<Option<Duration>>,
}

impl MockNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, page: MockPage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    /// Makes every download take `delay`, to keep fetches overlapping.
    pub fn with_download_delay(self, delay: Duration) -> Self {
        *self.download_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_page(&self, url: &str, page: MockPage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    /// Views opened and not yet closed.
    pub fn open_views(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    /// Highest number of views open at the same time.
    pub fn max_open_views(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// How many times `url` was loaded.
    pub fn navigations_to(&self, url: &str) -> usize {
        self.navigations.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn page_for(&self, page: &PageHandle) -> Result<MockPage, NavError> {
        let views = self.views.lock().unwrap();
        let url = views
            .get(&page.id())
            .ok_or(NavError::PageClosed { page_id: page.id() })?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(MockPage::Empty))
    }

    fn open_view(&self, url: &str) -> PageHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut views = self.views.lock().unwrap();
        views.insert(id, url.to_string());
        self.max_open.fetch_max(views.len(), Ordering::SeqCst);
        PageHandle::new(id, url)
    }
}

#[async_trait]
impl Navigator for MockNavigator {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<PageHandle, NavError> {
        *self
            .navigations
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(MockPage::Unreachable) => Err(NavError::transport(url, "connection refused")),
            _ => Ok(self.open_view(url)),
        }
    }

    async fn find(
        &self,
        page: &PageHandle,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, NavError> {
        let element = |text: &str, href: Option<&str>| ElementHandle {
            page_id: page.id(),
            index: 0,
            text: text.to_string(),
            href: href.map(str::to_string),
        };
        Ok(match (self.page_for(page)?, selector) {
            (MockPage::NotReady, Selector::TextContains(text)) => Some(element(text, None)),
            (MockPage::Ready(_), Selector::LinkText(label)) if label == "MP4" => {
                Some(element("MP4", Some("video.mp4")))
            }
            (MockPage::Listing(links), Selector::Href(href)) => links
                .iter()
                .find(|(link, _)| link == href)
                .map(|(link, _)| element("آفلاین", Some(link))),
            _ => None,
        })
    }

    async fn click(
        &self,
        page: &PageHandle,
        _element: &ElementHandle,
        _timeout: Duration,
    ) -> Result<(), NavError> {
        self.page_for(page)?;
        self.clicked.lock().unwrap().insert(page.id());
        Ok(())
    }

    async fn open_popup(
        &self,
        page: &PageHandle,
        element: &ElementHandle,
        _timeout: Duration,
    ) -> Result<PageHandle, NavError> {
        let MockPage::Listing(links) = self.page_for(page)? else {
            return Err(NavError::NotClickable {
                text: element.text.clone(),
            });
        };
        let target = links
            .iter()
            .find(|(link, _)| Some(link.as_str()) == element.href.as_deref())
            .map(|(_, target)| target.clone())
            .ok_or_else(|| NavError::NotClickable {
                text: element.text.clone(),
            })?;
        Ok(self.open_view(&target))
    }

    async fn await_download(
        &self,
        page: &PageHandle,
        _timeout: Duration,
    ) -> Result<DownloadPayload, NavError> {
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.clicked.lock().unwrap().remove(&page.id()) {
            return Err(NavError::NoDownload { page_id: page.id() });
        }
        match self.page_for(page)? {
            MockPage::Ready(bytes) => Ok(DownloadPayload::Bytes(bytes)),
            _ => Err(NavError::NoDownload { page_id: page.id() }),
        }
    }

    async fn close(&self, page: &PageHandle) {
        self.views.lock().unwrap().remove(&page.id());
    }
}

/// Extractor that "unpacks" an archive by copying its bytes into one media file.
#[derive(Debug, Default)]
pub struct MockExtractor {
    calls: AtomicUsize,
    media_name: Option<String>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces a file with this name instead of `video.mp4`.
    pub fn producing(name: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            media_name: Some(name.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(archive).await.map_err(|source| ExtractorError::Io { source })?;
        let name = self.media_name.as_deref().unwrap_or("video.mp4");
        let out = dest_dir.join(name);
        tokio::fs::write(&out, bytes).await.map_err(|source| ExtractorError::Io { source })?;
        Ok(vec![out])
    }
}

/// A listing fragment for a recording on the 14th of Mehr 1402 at `hh:mm` in the morning.
pub fn fragment(href: &str, hour: u32, minute: u32) -> String {
    format!(r#"<a class="btn" href="{href}">آفلاین</a> (جلسه، ۱۴ مهر ۱۴۰۲، ساعت {hour}:{minute:02} صبح)"#)
}

/// Config with short timeouts and no meaningful backoff.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig {
        page_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(1),
        ..HarvestConfig::default()
    }
}
