//! The tracking server as seen by the client.
//!
//! Implementations wrap whatever transport talks to the server; the state
//! layer only depends on this trait.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{
    ArtifactListing, Experiment, Metric, ModelVersion, Run, SearchRunsPage, SearchRunsRequest,
    TagTarget,
};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[async_trait]
pub trait TrackingApi: Send + Sync {
    async fn list_experiments(&self) -> ApiResult<Vec<Experiment>>;

    async fn get_experiment(&self, experiment_id: &str) -> ApiResult<Experiment>;

    async fn get_run(&self, run_uuid: &str) -> ApiResult<Run>;

    async fn search_runs(&self, request: &SearchRunsRequest) -> ApiResult<SearchRunsPage>;

    async fn get_metric_history(&self, run_uuid: &str, metric_key: &str) -> ApiResult<Vec<Metric>>;

    async fn list_artifacts(&self, run_uuid: &str, path: Option<&str>) -> ApiResult<ArtifactListing>;

    async fn set_tag(&self, target: &TagTarget, key: &str, value: &str) -> ApiResult<()>;

    async fn delete_tag(&self, target: &TagTarget, key: &str) -> ApiResult<()>;

    async fn search_model_versions(&self, filter: &str) -> ApiResult<Vec<ModelVersion>>;
}
