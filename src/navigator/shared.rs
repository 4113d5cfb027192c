//! Long-lived parent views shared across fetch tasks.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{NavError, Navigator, PageHandle, bounded};

/// Parent views (listing pages) shared by every task that clicks on them.
///
/// Clicking an element and observing the view it spawns must not interleave
/// with another click on the same parent, otherwise popups cannot be matched
/// to clicks. Each parent view therefore has its own async mutex; the guard
/// returned by [`SharedViews::acquire`] is the exclusive right to click on
/// that view. Different parent views proceed in parallel.
pub struct SharedViews {
    navigator: Arc<dyn Navigator>,
    page_timeout: Duration,
    /// Arc-wrapped so the map shard lock is released before awaiting the mutex.
    views: DashMap<String, Arc<Mutex<Option<PageHandle>>>>,
}

/// Exclusive access to one loaded parent view.
pub struct ViewGuard {
    navigator: Arc<dyn Navigator>,
    guard: OwnedMutexGuard<Option<PageHandle>>,
    page: PageHandle,
}

impl ViewGuard {
    /// The parent view.
    #[must_use]
    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    /// Closes the loaded view so the next holder reloads it.
    pub async fn invalidate(mut self) {
        if let Some(page) = self.guard.take() {
            debug!(page_id = page.id(), url = page.url(), "closing invalidated parent view");
            self.navigator.close(&page).await;
        }
    }
}

impl SharedViews {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>, page_timeout: Duration) -> Self {
        Self {
            navigator,
            page_timeout,
            views: DashMap::new(),
        }
    }

    /// Locks the parent view `key`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns the navigator's error when the view has to be loaded and fails.
    pub async fn acquire(&self, key: &str) -> Result<ViewGuard, NavError> {
        let slot = Arc::clone(
            self.views
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        );
        let mut guard = slot.lock_owned().await;

        let page = if let Some(page) = guard.as_ref() {
            page.clone()
        } else {
            debug!(view = key, "loading shared parent view");
            let page = bounded(
                "navigate",
                self.page_timeout,
                self.navigator.navigate(key, self.page_timeout),
            )
            .await?;
            *guard = Some(page.clone());
            page
        };
        Ok(ViewGuard {
            navigator: Arc::clone(&self.navigator),
            guard,
            page,
        })
    }

    /// Number of parent views currently loaded.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.views
            .iter()
            .filter(|entry| entry.value().try_lock().is_ok_and(|slot| slot.is_some()))
            .count()
    }

    /// Closes every loaded parent view.
    pub async fn close_all(&self) {
        let slots: Vec<Arc<Mutex<Option<PageHandle>>>> = self
            .views
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(page) = guard.take() {
                self.navigator.close(&page).await;
            }
        }
    }
}

impl std::fmt::Debug for SharedViews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedViews")
            .field("views", &self.views.len())
            .finish_non_exhaustive()
    }
}
