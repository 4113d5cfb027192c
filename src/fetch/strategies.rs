//! The built-in fetch strategies, in default chain order.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::navigator::{ElementHandle, NavError, PageHandle, bounded};
use crate::resolver::{RecordingRef, SourceAction};
use super::trigger::{fetch_via_triggers, not_ready_marker};
use super::{FetchContext, FetchStrategy, StrategyStep};

/// Loads the recording's page and clicks a download trigger on it.
///
/// Checks the not-ready markers before searching. The loaded page is kept on
/// the context for [`AlternateListingStrategy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLinkStrategy;

#[async_trait]
impl FetchStrategy for DirectLinkStrategy {
    fn name(&self) -> &'static str {
        "direct-link"
    }

    async fn attempt(
        &self,
        ctx: &FetchContext<'_>,
        recording: &RecordingRef,
        sink: &Path,
    ) -> Result<StrategyStep, NavError> {
        let SourceAction::Url(url) = &recording.source else {
            return Ok(StrategyStep::NotApplicable);
        };

        let page = ctx.scope().navigate(url).await?;
        ctx.set_landing(page.clone());

        if let Some(marker) = not_ready_marker(ctx, &page).await? {
            return Ok(StrategyStep::NotReady(format!(
                "{} is not ready yet ('{marker}')",
                recording.archive_name
            )));
        }
        fetch_via_triggers(ctx, &page, sink).await
    }
}

/// Follows an alternate recording-list link on the page loaded earlier and
/// searches it for a trigger once.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlternateListingStrategy;

#[async_trait]
impl FetchStrategy for AlternateListingStrategy {
    fn name(&self) -> &'static str {
        "alternate-listing"
    }

    async fn attempt(
        &self,
        ctx: &FetchContext<'_>,
        _recording: &RecordingRef,
        sink: &Path,
    ) -> Result<StrategyStep, NavError> {
        let Some(landing) = ctx.landing().cloned() else {
            return Ok(StrategyStep::NotApplicable);
        };
        let navigator = ctx.scope().navigator();
        let timeout = ctx.config().page_timeout;

        for selector in &ctx.config().alternate_listing_selectors {
            let found =
                bounded("find", timeout, navigator.find(&landing, selector, timeout)).await?;
            let Some(link) = found else {
                continue;
            };
            debug!(selector = %selector, "Following alternate listing");
            let listing = open_link(ctx, &landing, &link).await?;
            return fetch_via_triggers(ctx, &listing, sink).await;
        }
        Ok(StrategyStep::NotApplicable)
    }
}

/// Opens `link` in a new view: a plain navigation when it has a usable
/// target, otherwise whatever view clicking it spawns.
async fn open_link(
    ctx: &FetchContext<'_>,
    from: &PageHandle,
    link: &ElementHandle,
) -> Result<PageHandle, NavError> {
    let target = link
        .href
        .as_deref()
        .filter(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
        .and_then(|href| Url::parse(from.url()).ok()?.join(href).ok());
    match target {
        Some(url) => ctx.scope().navigate(url.as_str()).await,
        None => ctx.scope().open_popup(from, link).await,
    }
}

/// Clicks the recording's element on its shared listing view and searches the
/// spawned view for a trigger.
///
/// The listing view stays locked from finding the element until the popup is
/// open, so concurrent clicks on one listing cannot swap popups.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopupTriggerStrategy;

#[async_trait]
impl FetchStrategy for PopupTriggerStrategy {
    fn name(&self) -> &'static str {
        "popup-trigger"
    }

    async fn attempt(
        &self,
        ctx: &FetchContext<'_>,
        recording: &RecordingRef,
        sink: &Path,
    ) -> Result<StrategyStep, NavError> {
        let SourceAction::Trigger(trigger) = &recording.source else {
            return Ok(StrategyStep::NotApplicable);
        };
        let navigator = ctx.scope().navigator();
        let timeout = ctx.config().page_timeout;

        let popup = {
            let view = ctx.views().acquire(&trigger.view).await?;
            let found = bounded(
                "find",
                timeout,
                navigator.find(view.page(), &trigger.selector, timeout),
            )
            .await;
            let element = match found {
                Ok(Some(element)) => element,
                Ok(None) => return Ok(StrategyStep::NoTrigger),
                Err(e) => {
                    if matches!(e, NavError::PageClosed { .. }) {
                        view.invalidate().await;
                    }
                    return Err(e);
                }
            };
            match ctx.scope().open_popup(view.page(), &element).await {
                Ok(popup) => popup,
                Err(e) => {
                    if matches!(e, NavError::PageClosed { .. }) {
                        view.invalidate().await;
                    }
                    return Err(e);
                }
            }
        };

        if let Some(marker) = not_ready_marker(ctx, &popup).await? {
            return Ok(StrategyStep::NotReady(format!(
                "{} is not ready yet ('{marker}')",
                recording.archive_name
            )));
        }
        fetch_via_triggers(ctx, &popup, sink).await
    }
}
