//! Web navigation capability consumed by the fetch pipeline.
//!
//! The pipeline never touches a browser or HTTP client directly. It drives a
//! [`Navigator`] through a handful of operations (load a page, find an element,
//! click it, open a secondary view, await a triggered download) and treats
//! every failure as a [`NavError`].
//!
//! - [`Navigator`] - async trait implemented by navigation backends
//! - [`HttpNavigator`] - plain-HTTP backend (anchors only, no scripting)
//! - [`AttemptScope`] - tracks views opened during one fetch attempt
//! - [`SharedViews`] - long-lived parent views with per-view click serialization

mod http;
mod scope;
mod shared;

pub use http::HttpNavigator;
pub use scope::AttemptScope;
pub use shared::{SharedViews, ViewGuard};

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// How to locate an element on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// A link whose visible text contains this label (case-insensitive).
    LinkText(String),
    /// A link whose target ends with this suffix (case-insensitive).
    HrefSuffix(String),
    /// A link whose `href` attribute equals this value exactly.
    Href(String),
    /// Any page content containing this text.
    TextContains(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkText(text) => write!(f, "link text '{text}'"),
            Self::HrefSuffix(suffix) => write!(f, "link ending '{suffix}'"),
            Self::Href(href) => write!(f, "link '{href}'"),
            Self::TextContains(text) => write!(f, "text '{text}'"),
        }
    }
}

/// An open browsing surface (a page or popup).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageHandle {
    id: u64,
    url: String,
}

impl PageHandle {
    /// Creates a handle; backends pick ids unique among their open views.
    #[must_use]
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }

    /// Backend-assigned view id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// URL the view was loaded from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// An element found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Id of the view the element belongs to.
    pub page_id: u64,
    /// Backend-specific position of the element on the page.
    pub index: usize,
    /// Visible text of the element.
    pub text: String,
    /// Link target, if the element is a link.
    pub href: Option<String>,
}

/// Bytes delivered by a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadPayload {
    /// The whole body in memory.
    Bytes(Vec<u8>),
    /// The body was staged to a file by the backend.
    File(PathBuf),
}

/// Errors reported by navigation backends.
#[derive(Debug, Error)]
pub enum NavError {
    /// An operation did not finish within its timeout.
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Network or protocol failure.
    #[error("transport error loading {url}: {message}")]
    Transport {
        /// The URL being loaded.
        url: String,
        /// Backend description of the failure.
        message: String,
    },

    /// The page handle does not refer to an open view.
    #[error("view {page_id} is not open")]
    PageClosed {
        /// The unknown view id.
        page_id: u64,
    },

    /// The element cannot be activated.
    #[error("element '{text}' cannot be activated")]
    NotClickable {
        /// Visible text of the element.
        text: String,
    },

    /// No download was triggered on the view.
    #[error("no download was triggered on view {page_id}")]
    NoDownload {
        /// The view that was awaited.
        page_id: u64,
    },

    /// Staging downloaded bytes failed.
    #[error("IO error staging download: {source}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl NavError {
    /// Creates a timeout error.
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// A navigation backend.
///
/// Every method takes a caller-supplied timeout. Callers additionally bound
/// each call with [`bounded`], so a backend that ignores the timeout cannot
/// stall a fetch.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Opens a new view and loads `url` into it.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<PageHandle, NavError>;

    /// Finds the first element matching `selector` on `page`.
    async fn find(
        &self,
        page: &PageHandle,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, NavError>;

    /// Activates `element`, possibly triggering a download on `page`.
    async fn click(
        &self,
        page: &PageHandle,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), NavError>;

    /// Activates `element` and returns the secondary view it spawns.
    async fn open_popup(
        &self,
        page: &PageHandle,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<PageHandle, NavError>;

    /// Waits for the download triggered on `page` to complete.
    async fn await_download(
        &self,
        page: &PageHandle,
        timeout: Duration,
    ) -> Result<DownloadPayload, NavError>;

    /// Closes a view. Closing an unknown view is a no-op.
    async fn close(&self, page: &PageHandle);
}

/// Runs `future` with a hard timeout, mapping expiry to [`NavError::Timeout`].
///
/// # Errors
///
/// Returns the future's own error, or [`NavError::Timeout`] on expiry.
pub async fn bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T, NavError>
where
    F: Future<Output = Result<T, NavError>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| NavError::timeout(operation, timeout))?
}
