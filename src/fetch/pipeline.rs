//! Supervised fetch of one recording.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::HarvestConfig;
use crate::navigator::{AttemptScope, Navigator, SharedViews};
use crate::resolver::RecordingRef;
use super::{FetchChain, FetchContext, RetryPolicy, RetryReport, RetrySupervisor};

/// Runs the fetch chain under the retry supervisor.
///
/// Each attempt gets a fresh [`AttemptScope`]; every view the attempt opened
/// is closed before the next attempt starts.
pub struct FetchPipeline {
    navigator: Arc<dyn Navigator>,
    views: Arc<SharedViews>,
    config: Arc<HarvestConfig>,
    chain: FetchChain,
    supervisor: RetrySupervisor,
}

impl FetchPipeline {
    /// Creates a pipeline with the default chain and a policy built from `config`.
    #[must_use]
    pub fn new(
        navigator: Arc<dyn Navigator>,
        views: Arc<SharedViews>,
        config: Arc<HarvestConfig>,
    ) -> Self {
        let policy = RetryPolicy::with_max_attempts(config.max_attempts)
            .with_base_delay(config.retry_base_delay);
        Self {
            navigator,
            views,
            config,
            chain: FetchChain::default(),
            supervisor: RetrySupervisor::new(policy),
        }
    }

    /// Replaces the strategy chain.
    #[must_use]
    pub fn with_chain(mut self, chain: FetchChain) -> Self {
        self.chain = chain;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.supervisor = RetrySupervisor::new(policy);
        self
    }

    /// The navigator attempts run against.
    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Fetches the archive for `recording` into `sink`.
    #[instrument(skip_all, fields(recording = %recording.archive_name))]
    pub async fn fetch(&self, recording: &RecordingRef, sink: &Path) -> RetryReport {
        self.supervisor
            .run(|attempt| async move {
                let scope =
                    AttemptScope::new(Arc::clone(&self.navigator), self.config.page_timeout);
                let ctx = FetchContext::new(&scope, &self.views, &self.config);
                debug!(attempt, source = %recording.source, "Starting fetch attempt");

                let outcome = self.chain.fetch(&ctx, recording, sink).await;

                drop(ctx);
                scope.close_all().await;
                outcome
            })
            .await
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("chain", &self.chain)
            .field("policy", self.supervisor.policy())
            .finish_non_exhaustive()
    }
}
