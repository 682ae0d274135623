//! trackview: client-side state layer for experiment-tracking dashboards.
//!
//! This crate re-exports `trackview-core` and adds [`App`], the object an
//! application builds once at startup to own the store and talk to the
//! tracking server.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use trackview_core::*;

use trackview_core::legend::LegendClickResolver;
use trackview_core::models::SearchRunsRequest;

/// Store, dispatcher and configuration of one running client.
pub struct App<A: TrackingApi + 'static> {
    config: ClientConfig,
    dispatcher: Dispatcher<A>,
}

impl<A: TrackingApi + 'static> App<A> {
    pub fn new(api: A, config: ClientConfig) -> Self {
        let store = Store::new().shared();
        info!(poll_interval = ?config.poll_interval(), "trackview client initialized");
        Self {
            config,
            dispatcher: Dispatcher::new(Arc::new(api), store),
        }
    }

    /// Build with configuration read from a YAML file; a missing file means
    /// defaults.
    pub fn from_config_file(api: A, path: &Path) -> anyhow::Result<Self> {
        let config = ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        Ok(Self::new(api, config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        self.dispatcher.store()
    }

    pub fn dispatcher(&self) -> &Dispatcher<A> {
        &self.dispatcher
    }

    /// First page of runs, sized by `runs_page_size` unless the request sets
    /// its own limit.
    pub async fn search_runs(&self, request: &SearchRunsRequest) -> RequestId {
        self.dispatcher.search_runs(&self.paged(request)).await
    }

    pub async fn load_more_runs(&self, request: &SearchRunsRequest) -> Option<RequestId> {
        self.dispatcher.load_more_runs(&self.paged(request)).await
    }

    fn paged(&self, request: &SearchRunsRequest) -> SearchRunsRequest {
        SearchRunsRequest {
            max_results: request.max_results.or(Some(self.config.runs_page_size)),
            ..request.clone()
        }
    }

    /// Start live polling for a plot view over `run_uuids`.
    pub fn poll_metrics(&self, run_uuids: Vec<String>, metric_keys: Vec<String>, focused: bool) -> PollerHandle {
        MetricPoller::new(self.dispatcher.clone(), run_uuids, metric_keys, &self.config).spawn(focused)
    }

    pub fn legend_resolver(&self) -> LegendClickResolver {
        LegendClickResolver::from_config(&self.config)
    }

    /// Forget every cached entity and request.
    pub async fn reset(&self) {
        self.store().write().await.reset();
    }
}
