//! Plain-HTTP navigation backend.
//!
//! Loads pages with `reqwest` and scans their markup for anchors. There is no
//! script execution: a "click" on a link records its target, and the target is
//! fetched by [`Navigator::await_download`]. Popups are modelled as loading the
//! clicked link into a new view. Enough for listing sites whose download
//! buttons are ordinary links.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::{DownloadPayload, ElementHandle, NavError, Navigator, PageHandle, Selector};

const CONNECT_TIMEOUT_SECS: u64 = 30;

#[allow(clippy::expect_used)]
static ANCHOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("anchor regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#).expect("href regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]+>").expect("tag regex is valid") // Static pattern, safe to panic
});

#[derive(Debug)]
struct PageState {
    url: Url,
    body: String,
    pending_download: Option<Url>,
}

#[derive(Debug, Clone)]
struct Anchor {
    href: Option<String>,
    text: String,
}

/// Navigation backend built on a plain HTTP client.
#[derive(Debug)]
pub struct HttpNavigator {
    client: Client,
    pages: DashMap<u64, PageState>,
    next_id: AtomicU64,
    staging: TempDir,
}

impl HttpNavigator {
    /// Creates a navigator with an empty cookie store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the staging directory cannot be created.
    pub fn new() -> Result<Self, NavError> {
        Self::build(None)
    }

    /// Creates a navigator that sends `cookie` (a `Cookie` header value such
    /// as `session=abc; lang=fa`) with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if `cookie` is not a valid header value or the client
    /// cannot be created.
    pub fn with_session_cookie(cookie: &str) -> Result<Self, NavError> {
        let mut value = HeaderValue::from_str(cookie.trim())
            .map_err(|e| NavError::transport("<session cookie>", e))?;
        value.set_sensitive(true);
        Self::build(Some(value))
    }

    fn build(session_cookie: Option<HeaderValue>) -> Result<Self, NavError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie {
            headers.insert(COOKIE, cookie);
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .cookie_store(true)
            .default_headers(headers)
            .user_agent(concat!("harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NavError::transport("<client>", e))?;
        let staging = tempfile::Builder::new()
            .prefix("harvester-staging-")
            .tempdir()
            .map_err(|source| NavError::Io { source })?;
        Ok(Self {
            client,
            pages: DashMap::new(),
            next_id: AtomicU64::new(1),
            staging,
        })
    }

    /// Number of views currently open.
    #[must_use]
    pub fn open_views(&self) -> usize {
        self.pages.len()
    }

    async fn load(&self, url: Url, timeout: Duration) -> Result<PageHandle, NavError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url.as_str(), e, timeout))?
            .error_for_status()
            .map_err(|e| NavError::transport(url.as_str(), e))?;
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url.as_str(), e, timeout))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = PageHandle::new(id, final_url.as_str());
        debug!(page_id = id, url = %final_url, bytes = body.len(), "view loaded");
        self.pages.insert(
            id,
            PageState {
                url: final_url,
                body,
                pending_download: None,
            },
        );
        Ok(handle)
    }

    fn resolve_link(&self, page: &PageHandle, element: &ElementHandle) -> Result<Url, NavError> {
        let state = self
            .pages
            .get(&page.id())
            .ok_or(NavError::PageClosed { page_id: page.id() })?;
        let href = element
            .href
            .as_deref()
            .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
            .ok_or_else(|| NavError::NotClickable {
                text: element.text.clone(),
            })?;
        state
            .url
            .join(href)
            .map_err(|e| NavError::transport(href, e))
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    #[instrument(skip(self), fields(backend = "http"))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<PageHandle, NavError> {
        let parsed = Url::parse(url).map_err(|e| NavError::transport(url, e))?;
        self.load(parsed, timeout).await
    }

    async fn find(
        &self,
        page: &PageHandle,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, NavError> {
        let state = self
            .pages
            .get(&page.id())
            .ok_or(NavError::PageClosed { page_id: page.id() })?;
        Ok(find_in_markup(&state.body, selector).map(|(index, anchor)| ElementHandle {
            page_id: page.id(),
            index,
            text: anchor.text,
            href: anchor.href,
        }))
    }

    async fn click(
        &self,
        page: &PageHandle,
        element: &ElementHandle,
        _timeout: Duration,
    ) -> Result<(), NavError> {
        let target = self.resolve_link(page, element)?;
        let mut state = self
            .pages
            .get_mut(&page.id())
            .ok_or(NavError::PageClosed { page_id: page.id() })?;
        debug!(page_id = page.id(), target = %target, "link activated");
        state.pending_download = Some(target);
        Ok(())
    }

    async fn open_popup(
        &self,
        page: &PageHandle,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<PageHandle, NavError> {
        let target = self.resolve_link(page, element)?;
        self.load(target, timeout).await
    }

    #[instrument(skip(self), fields(backend = "http", page_id = page.id()))]
    async fn await_download(
        &self,
        page: &PageHandle,
        timeout: Duration,
    ) -> Result<DownloadPayload, NavError> {
        let target = self
            .pages
            .get_mut(&page.id())
            .ok_or(NavError::PageClosed { page_id: page.id() })?
            .pending_download
            .take()
            .ok_or(NavError::NoDownload { page_id: page.id() })?;

        let response = self
            .client
            .get(target.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(target.as_str(), e, timeout))?
            .error_for_status()
            .map_err(|e| NavError::transport(target.as_str(), e))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let partial = PartialFile::new(self.staging.path().join(format!("download-{id}.part")));
        let bytes = stream_to_file(response, partial.path(), target.as_str(), timeout).await?;
        let staged = partial.keep();
        debug!(url = %target, bytes, path = %staged.display(), "download staged");
        Ok(DownloadPayload::File(staged))
    }

    async fn close(&self, page: &PageHandle) {
        if self.pages.remove(&page.id()).is_some() {
            debug!(page_id = page.id(), "view closed");
        }
    }
}

/// A staged download removed on drop unless kept, so failed or cancelled
/// transfers leave nothing behind.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "cleaning up partial download");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    url: &str,
    timeout: Duration,
) -> Result<u64, NavError> {
    let file = File::create(path)
        .await
        .map_err(|source| NavError::Io { source })?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| map_reqwest_error(url, e, timeout))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|source| NavError::Io { source })?;
        bytes_written += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|source| NavError::Io { source })?;
    Ok(bytes_written)
}

fn map_reqwest_error(url: &str, error: reqwest::Error, timeout: Duration) -> NavError {
    if error.is_timeout() {
        NavError::timeout("http request", timeout)
    } else {
        NavError::transport(url, error)
    }
}

fn anchors(markup: &str) -> Vec<Anchor> {
    ANCHOR_PATTERN
        .captures_iter(markup)
        .map(|caps| {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let inner = caps.get(2).map_or("", |m| m.as_str());
            Anchor {
                href: HREF_PATTERN
                    .captures(attrs)
                    .and_then(|h| h.get(1))
                    .map(|m| m.as_str().replace("&amp;", "&")),
                text: TAG_PATTERN.replace_all(inner, " ").trim().to_string(),
            }
        })
        .collect()
}

/// Finds the first anchor matching `selector`.
///
/// `TextContains` matches anywhere in the page; the returned element is then
/// a synthetic handle with index `usize::MAX` and no link.
fn find_in_markup(markup: &str, selector: &Selector) -> Option<(usize, Anchor)> {
    if let Selector::TextContains(text) = selector {
        let visible = TAG_PATTERN.replace_all(markup, " ");
        return visible.contains(text.as_str()).then(|| {
            (
                usize::MAX,
                Anchor {
                    href: None,
                    text: text.clone(),
                },
            )
        });
    }

    anchors(markup)
        .into_iter()
        .enumerate()
        .find(|(_, anchor)| anchor_matches(anchor, selector))
}

fn anchor_matches(anchor: &Anchor, selector: &Selector) -> bool {
    match selector {
        Selector::LinkText(label) => anchor
            .text
            .to_lowercase()
            .contains(&label.to_lowercase()),
        Selector::HrefSuffix(suffix) => anchor.href.as_deref().is_some_and(|href| {
            let path = href.split(['?', '#']).next().unwrap_or(href);
            path.to_lowercase().ends_with(&suffix.to_lowercase())
        }),
        Selector::Href(expected) => anchor.href.as_deref() == Some(expected.as_str()),
        Selector::TextContains(_) => false,
    }
}
