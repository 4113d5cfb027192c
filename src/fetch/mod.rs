//! Archive fetching: an ordered chain of fallback strategies under a retry budget.
//!
//! - [`FetchStrategy`] - one way of locating and triggering the archive download
//! - [`FetchChain`] - tries strategies in order and maps their steps to a [`FetchOutcome`]
//! - [`RetrySupervisor`] - repeats transient failures within a [`RetryPolicy`]
//! - [`FetchPipeline`] - one supervised fetch with per-attempt view cleanup

mod pipeline;
mod retry;
mod strategies;
mod trigger;

pub use pipeline::FetchPipeline;
pub use retry::{RetryDecision, RetryPolicy, RetryReport, RetrySupervisor};
pub use strategies::{AlternateListingStrategy, DirectLinkStrategy, PopupTriggerStrategy};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::HarvestConfig;
use crate::navigator::{AttemptScope, NavError, PageHandle, SharedViews};
use crate::resolver::RecordingRef;

/// Reason reported when no strategy located a download trigger.
pub const NO_TRIGGER_REASON: &str = "no download trigger found";

/// Final result of fetching one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive is at this path.
    Success(PathBuf),
    /// The fetch failed in a way another attempt may fix.
    TransientFailure(String),
    /// The fetch cannot succeed now; retrying is pointless.
    TerminalFailure(String),
}

impl FetchOutcome {
    /// Creates a transient failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    /// Creates a terminal failure.
    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::TerminalFailure(reason.into())
    }

    /// Returns true for [`FetchOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// What a single strategy achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyStep {
    /// The archive was written to this path.
    Fetched(PathBuf),
    /// The server says the recording is still being prepared.
    NotReady(String),
    /// A trigger was found but every transfer failed.
    TransferFailed(String),
    /// The strategy ran but found nothing to click.
    NoTrigger,
    /// The strategy does not apply to this recording.
    NotApplicable,
}

/// State shared by the strategies of one fetch attempt.
pub struct FetchContext<'a> {
    scope: &'a AttemptScope,
    views: &'a SharedViews,
    config: &'a HarvestConfig,
    landing: OnceLock<PageHandle>,
}

impl<'a> FetchContext<'a> {
    /// Creates a context for one attempt.
    #[must_use]
    pub fn new(scope: &'a AttemptScope, views: &'a SharedViews, config: &'a HarvestConfig) -> Self {
        Self {
            scope,
            views,
            config,
            landing: OnceLock::new(),
        }
    }

    /// Views opened by this attempt.
    #[must_use]
    pub fn scope(&self) -> &AttemptScope {
        self.scope
    }

    /// Shared parent views.
    #[must_use]
    pub fn views(&self) -> &SharedViews {
        self.views
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &HarvestConfig {
        self.config
    }

    /// The recording page loaded by an earlier strategy, if any.
    #[must_use]
    pub fn landing(&self) -> Option<&PageHandle> {
        self.landing.get()
    }

    /// Records the recording page for later strategies. Only the first call has effect.
    pub fn set_landing(&self, page: PageHandle) {
        let _ = self.landing.set(page);
    }
}

impl std::fmt::Debug for FetchContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("scope", self.scope)
            .field("landing", &self.landing.get())
            .finish_non_exhaustive()
    }
}

/// One tactic for obtaining an archive.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Tries to write the archive for `recording` to `sink`.
    ///
    /// # Errors
    ///
    /// Navigation failures are returned as errors and end the attempt as a
    /// transient failure.
    async fn attempt(
        &self,
        ctx: &FetchContext<'_>,
        recording: &RecordingRef,
        sink: &Path,
    ) -> Result<StrategyStep, NavError>;
}

/// Ordered list of fetch strategies.
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl Default for FetchChain {
    fn default() -> Self {
        let mut chain = Self::new();
        chain.register(Box::new(DirectLinkStrategy));
        chain.register(Box::new(AlternateListingStrategy));
        chain.register(Box::new(PopupTriggerStrategy));
        chain
    }
}

impl FetchChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy; strategies run in registration order.
    pub fn register(&mut self, strategy: Box<dyn FetchStrategy>) {
        debug!(name = strategy.name(), "Registering fetch strategy");
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies, in order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the strategies in order until one settles the outcome.
    ///
    /// A not-ready page ends the chain as a terminal failure and a failed
    /// transfer as a transient one. Strategies that find nothing hand over to
    /// the next; if none finds a trigger the result is a transient failure.
    #[tracing::instrument(skip_all, fields(recording = %recording.archive_name))]
    pub async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        recording: &RecordingRef,
        sink: &Path,
    ) -> FetchOutcome {
        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "Trying fetch strategy");
            match strategy.attempt(ctx, recording, sink).await {
                Ok(StrategyStep::Fetched(path)) => {
                    info!(strategy = strategy.name(), path = %path.display(), "Archive fetched");
                    return FetchOutcome::Success(path);
                }
                Ok(StrategyStep::NotReady(reason)) => {
                    info!(strategy = strategy.name(), reason = %reason, "Recording not ready");
                    return FetchOutcome::TerminalFailure(reason);
                }
                Ok(StrategyStep::TransferFailed(reason)) => {
                    return FetchOutcome::TransientFailure(reason);
                }
                Ok(StrategyStep::NoTrigger) => {
                    debug!(strategy = strategy.name(), "No trigger found, trying next strategy");
                }
                Ok(StrategyStep::NotApplicable) => {}
                Err(error) => {
                    return FetchOutcome::TransientFailure(format!("{}: {error}", strategy.name()));
                }
            }
        }
        FetchOutcome::transient(NO_TRIGGER_REASON)
    }
}

impl std::fmt::Debug for FetchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchChain")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::navigator::{DownloadPayload, ElementHandle, Navigator, Selector};
    use crate::resolver::{ScheduledAt, SourceAction};

    struct NullNavigator;

    #[async_trait]
    impl Navigator for NullNavigator {
        async fn navigate(&self, url: &str, _: Duration) -> Result<PageHandle, NavError> {
            Ok(PageHandle::new(1, url))
        }
        async fn find(
            &self,
            _: &PageHandle,
            _: &Selector,
            _: Duration,
        ) -> Result<Option<ElementHandle>, NavError> {
            Ok(None)
        }
        async fn click(
            &self,
            _: &PageHandle,
            _: &ElementHandle,
            _: Duration,
        ) -> Result<(), NavError> {
            Ok(())
        }
        async fn open_popup(
            &self,
            page: &PageHandle,
            _: &ElementHandle,
            _: Duration,
        ) -> Result<PageHandle, NavError> {
            Ok(page.clone())
        }
        async fn await_download(
            &self,
            page: &PageHandle,
            _: Duration,
        ) -> Result<DownloadPayload, NavError> {
            Err(NavError::NoDownload { page_id: page.id() })
        }
        async fn close(&self, _: &PageHandle) {}
    }

    struct Scripted {
        name: &'static str,
        step: Result<StrategyStep, ()>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn attempt(
            &self,
            _: &FetchContext<'_>,
            _: &RecordingRef,
            _: &Path,
        ) -> Result<StrategyStep, NavError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.step
                .clone()
                .map_err(|()| NavError::timeout("navigate", Duration::from_secs(1)))
        }
    }

    fn recording() -> RecordingRef {
        RecordingRef::new(
            1,
            ScheduledAt {
                year: 1402,
                month: 7,
                day: 14,
                hour: 10,
                minute: 30,
            },
            SourceAction::Url("https://lms.example/rec/1".into()),
            "rar",
            "mp4",
        )
    }

    async fn run_chain(steps: Vec<Result<StrategyStep, ()>>) -> (FetchOutcome, Vec<u32>) {
        let navigator: Arc<dyn Navigator> = Arc::new(NullNavigator);
        let config = HarvestConfig::default();
        let scope = AttemptScope::new(Arc::clone(&navigator), config.page_timeout);
        let views = SharedViews::new(navigator, config.page_timeout);
        let ctx = FetchContext::new(&scope, &views, &config);

        let counters: Vec<Arc<AtomicU32>> =
            steps.iter().map(|_| Arc::new(AtomicU32::new(0))).collect();
        let mut chain = FetchChain::new();
        for (step, calls) in steps.into_iter().zip(&counters) {
            chain.register(Box::new(Scripted {
                name: "scripted",
                step,
                calls: Arc::clone(calls),
            }));
        }

        let outcome = chain.fetch(&ctx, &recording(), Path::new("01.rar")).await;
        (
            outcome,
            counters.iter().map(|c| c.load(Ordering::SeqCst)).collect(),
        )
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_fetch() {
        let (outcome, calls) = run_chain(vec![
            Ok(StrategyStep::NotApplicable),
            Ok(StrategyStep::Fetched(PathBuf::from("01.rar"))),
            Ok(StrategyStep::Fetched(PathBuf::from("other.rar"))),
        ])
        .await;
        assert_eq!(outcome, FetchOutcome::Success(PathBuf::from("01.rar")));
        assert_eq!(calls, vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_chain_not_ready_is_terminal_and_short_circuits() {
        let (outcome, calls) = run_chain(vec![
            Ok(StrategyStep::NotReady("being prepared".into())),
            Ok(StrategyStep::Fetched(PathBuf::from("01.rar"))),
        ])
        .await;
        assert_eq!(outcome, FetchOutcome::terminal("being prepared"));
        assert_eq!(calls, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_chain_transfer_failure_does_not_fall_through() {
        let (outcome, calls) = run_chain(vec![
            Ok(StrategyStep::TransferFailed("connection reset".into())),
            Ok(StrategyStep::Fetched(PathBuf::from("01.rar"))),
        ])
        .await;
        assert_eq!(outcome, FetchOutcome::transient("connection reset"));
        assert_eq!(calls, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_chain_exhausted_is_transient_no_trigger() {
        let (outcome, calls) = run_chain(vec![
            Ok(StrategyStep::NoTrigger),
            Ok(StrategyStep::NotApplicable),
        ])
        .await;
        assert_eq!(outcome, FetchOutcome::transient(NO_TRIGGER_REASON));
        assert_eq!(calls, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_chain_navigation_error_is_transient() {
        let (outcome, _) = run_chain(vec![Err(())]).await;
        assert!(matches!(
            outcome,
            FetchOutcome::TransientFailure(reason) if reason.contains("timed out")
        ));
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(
            FetchChain::default().strategy_names(),
            vec!["direct-link", "alternate-listing", "popup-trigger"]
        );
    }
}
