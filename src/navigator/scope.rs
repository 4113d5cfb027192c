//! Per-attempt view tracking.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{ElementHandle, NavError, Navigator, PageHandle, bounded};

/// Views opened during one fetch attempt.
///
/// Every view an attempt opens goes through its scope, and the fetch pipeline
/// calls [`AttemptScope::close_all`] before the attempt finishes, so a failed
/// attempt never leaves a view behind for the next one.
pub struct AttemptScope {
    navigator: Arc<dyn Navigator>,
    page_timeout: Duration,
    opened: Mutex<Vec<PageHandle>>,
}

impl AttemptScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>, page_timeout: Duration) -> Self {
        Self {
            navigator,
            page_timeout,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// The navigator views are opened with.
    #[must_use]
    pub fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    /// Opens a new view on `url` and tracks it.
    ///
    /// # Errors
    ///
    /// Returns the navigator's error or a timeout.
    pub async fn navigate(&self, url: &str) -> Result<PageHandle, NavError> {
        let page = bounded(
            "navigate",
            self.page_timeout,
            self.navigator.navigate(url, self.page_timeout),
        )
        .await?;
        self.track(page.clone());
        Ok(page)
    }

    /// Opens the secondary view spawned by clicking `element` and tracks it.
    ///
    /// # Errors
    ///
    /// Returns the navigator's error or a timeout.
    pub async fn open_popup(
        &self,
        parent: &PageHandle,
        element: &ElementHandle,
    ) -> Result<PageHandle, NavError> {
        let popup = bounded(
            "open_popup",
            self.page_timeout,
            self.navigator.open_popup(parent, element, self.page_timeout),
        )
        .await?;
        self.track(popup.clone());
        Ok(popup)
    }

    /// Number of views currently tracked.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Closes every tracked view.
    pub async fn close_all(&self) {
        let pages: Vec<PageHandle> = std::mem::take(
            &mut *self.opened.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for page in pages.iter().rev() {
            debug!(page_id = page.id(), url = page.url(), "closing attempt view");
            self.navigator.close(page).await;
        }
    }

    fn track(&self, page: PageHandle) {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
    }
}

impl std::fmt::Debug for AttemptScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptScope")
            .field("open_count", &self.open_count())
            .finish_non_exhaustive()
    }
}
