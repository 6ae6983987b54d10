//! Builder that wires configuration and collaborators into a [`PublishingService`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;

use crate::config::PublisherConfig;
use crate::core::adapter::{ChunkedPublishAdapter, MediaResolver, PublishAdapter};
use crate::core::audit::{ActivityLog, TracingActivityLog};
use crate::core::coordinator::PublicationCoordinator;
use crate::core::error::AppResult;
use crate::core::repository::PostRepository;
use crate::core::upload::PublishEndpoint;
use crate::infra::{GraphVideoEndpoint, InMemoryPostRepository, LocalFileResolver};
use crate::runtime::PublishingService;
use crate::util::{Clock, SystemClock};

/// Assembles a publishing service.
///
/// The publish adapter is taken, in order of preference, from
/// [`PublisherBuilder::adapter`], from [`PublisherBuilder::endpoint`], or from
/// the Graph section of the configuration.
pub struct PublisherBuilder {
    config: PublisherConfig,
    repository: Option<Arc<dyn PostRepository>>,
    adapter: Option<Arc<dyn PublishAdapter>>,
    endpoint: Option<Arc<dyn PublishEndpoint>>,
    resolver: Option<Arc<dyn MediaResolver>>,
    media_root: PathBuf,
    activity: Option<Arc<dyn ActivityLog>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PublisherBuilder {
    /// Start from `config`.
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            repository: None,
            adapter: None,
            endpoint: None,
            resolver: None,
            media_root: PathBuf::from("."),
            activity: None,
            clock: None,
        }
    }

    /// Post store. Defaults to an in-memory repository.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn PostRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Fully custom publish adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn PublishAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Upload endpoint, driven through the chunked upload client.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<dyn PublishEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Media resolver. Defaults to local files under [`PublisherBuilder::media_root`].
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn MediaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Root directory for the default local file resolver.
    #[must_use]
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    /// Activity sink. Defaults to [`TracingActivityLog`].
    #[must_use]
    pub fn activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Time source. Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate configuration and assemble the service.
    pub fn build(self) -> AppResult<PublishingService> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;
        if self.config.scheduler.interval_is_unusual() {
            tracing::warn!(
                "sweep interval of {}s is outside the usual 15-60s range",
                self.config.scheduler.sweep_interval_secs
            );
        }

        let adapter: Arc<dyn PublishAdapter> = if let Some(adapter) = self.adapter {
            adapter
        } else {
            let endpoint: Arc<dyn PublishEndpoint> = match (self.endpoint, &self.config.graph) {
                (Some(endpoint), _) => endpoint,
                (None, Some(graph)) => Arc::new(GraphVideoEndpoint::new(graph.clone())?),
                (None, None) => {
                    bail!("no publish adapter: provide an adapter, an endpoint, or graph settings")
                }
            };
            let resolver = self
                .resolver
                .unwrap_or_else(|| Arc::new(LocalFileResolver::new(self.media_root)));
            Arc::new(ChunkedPublishAdapter::new(
                endpoint,
                resolver,
                self.config.upload.clone(),
            ))
        };

        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryPostRepository::new()));
        let activity = self
            .activity
            .unwrap_or_else(|| Arc::new(TracingActivityLog));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let coordinator = PublicationCoordinator::new(repository, adapter, activity, clock)
            .with_attempt_timeout(Some(self.config.scheduler.attempt_timeout()));
        tracing::debug!(
            "publishing service assembled for {}",
            coordinator.adapter().platform()
        );
        Ok(PublishingService::new(
            Arc::new(coordinator),
            self.config.scheduler,
        ))
    }
}
