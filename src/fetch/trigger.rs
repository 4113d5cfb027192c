//! Trigger search and download persistence on a loaded view.

use std::path::Path;

use tracing::{debug, warn};

use crate::fs_util::{atomic_write, move_file};
use crate::navigator::{DownloadPayload, NavError, PageHandle, Selector, bounded};
use super::{FetchContext, StrategyStep};

/// Returns the first not-ready marker present on `page`.
pub(crate) async fn not_ready_marker(
    ctx: &FetchContext<'_>,
    page: &PageHandle,
) -> Result<Option<String>, NavError> {
    let navigator = ctx.scope().navigator();
    let timeout = ctx.config().page_timeout;
    for marker in &ctx.config().not_ready_markers {
        let selector = Selector::TextContains(marker.clone());
        if bounded("find", timeout, navigator.find(page, &selector, timeout))
            .await?
            .is_some()
        {
            return Ok(Some(marker.clone()));
        }
    }
    Ok(None)
}

/// Clicks download candidates on `page` in priority order and stores the first
/// completed download at `sink`.
///
/// Every candidate that is present gets a try. If none is present the result
/// is [`StrategyStep::NoTrigger`]; if all present ones fail it is
/// [`StrategyStep::TransferFailed`] with the last failure.
pub(crate) async fn fetch_via_triggers(
    ctx: &FetchContext<'_>,
    page: &PageHandle,
    sink: &Path,
) -> Result<StrategyStep, NavError> {
    let navigator = ctx.scope().navigator();
    let config = ctx.config();
    let mut last_failure: Option<String> = None;

    for selector in &config.trigger_candidates {
        let found = bounded(
            "find",
            config.page_timeout,
            navigator.find(page, selector, config.page_timeout),
        )
        .await?;
        let Some(element) = found else {
            continue;
        };
        debug!(selector = %selector, page_id = page.id(), "Download trigger located");

        let transfer = async {
            bounded(
                "click",
                config.page_timeout,
                navigator.click(page, &element, config.page_timeout),
            )
            .await?;
            bounded(
                "await_download",
                config.transfer_timeout,
                navigator.await_download(page, config.transfer_timeout),
            )
            .await
        };

        match transfer.await {
            Ok(payload) => match store_payload(payload, sink).await {
                Ok(()) => return Ok(StrategyStep::Fetched(sink.to_path_buf())),
                Err(e) => {
                    warn!(selector = %selector, error = %e, "Storing download failed");
                    last_failure = Some(format!("storing {}: {e}", sink.display()));
                }
            },
            Err(e) => {
                warn!(selector = %selector, error = %e, "Download via trigger failed");
                last_failure = Some(e.to_string());
            }
        }
    }

    Ok(last_failure.map_or(StrategyStep::NoTrigger, StrategyStep::TransferFailed))
}

/// Places a completed download at `sink` without exposing a partial file.
async fn store_payload(payload: DownloadPayload, sink: &Path) -> std::io::Result<()> {
    match payload {
        DownloadPayload::Bytes(bytes) => atomic_write(sink, bytes).await,
        DownloadPayload::File(staged) => move_file(&staged, sink).await,
    }
}
