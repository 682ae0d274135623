//! Issue server calls and feed their progress into the store.
//!
//! Every call gets a fresh request id. A `Pending` action is dispatched
//! before the call and a `Fulfilled`/`Rejected` one after it, so failures end
//! up in the lifecycle tracker instead of being returned to the caller.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::actions::{Action, ActionPayload, Phase, RequestId};
use crate::api::{ApiResult, TrackingApi};
use crate::models::{SearchRunsRequest, TagTarget};
use crate::store::SharedStore;

pub struct Dispatcher<A: TrackingApi> {
    api: Arc<A>,
    store: SharedStore,
}

impl<A: TrackingApi> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            store: Arc::clone(&self.store),
        }
    }
}

impl<A: TrackingApi> Dispatcher<A> {
    pub fn new(api: Arc<A>, store: SharedStore) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    async fn track<T, F>(&self, make: impl Fn(Phase<T>) -> ActionPayload, call: F) -> RequestId
    where
        F: Future<Output = ApiResult<T>>,
    {
        let id = RequestId::new();
        self.store
            .write()
            .await
            .dispatch(&Action::new(id.clone(), make(Phase::Pending)));

        let result = call.await;
        if let Err(e) = &result {
            warn!(request = %id, error = %e, "Request failed");
        }

        let action = Action::new(id.clone(), make(Phase::from_result(result)));
        debug!(request = %id, action = action.payload.name(), "Request settled");
        self.store.write().await.dispatch(&action);
        id
    }

    pub async fn list_experiments(&self) -> RequestId {
        self.track(ActionPayload::ListExperiments, self.api.list_experiments())
            .await
    }

    pub async fn get_experiment(&self, experiment_id: &str) -> RequestId {
        self.track(
            |phase| ActionPayload::GetExperiment {
                experiment_id: experiment_id.to_string(),
                phase,
            },
            self.api.get_experiment(experiment_id),
        )
        .await
    }

    pub async fn get_run(&self, run_uuid: &str) -> RequestId {
        self.track(
            |phase| ActionPayload::GetRun {
                run_uuid: run_uuid.to_string(),
                phase,
            },
            self.api.get_run(run_uuid),
        )
        .await
    }

    /// Fetch the first page of runs, replacing whatever runs are cached.
    pub async fn search_runs(&self, request: &SearchRunsRequest) -> RequestId {
        let request = SearchRunsRequest {
            page_token: None,
            ..request.clone()
        };
        self.track(ActionPayload::SearchRuns, self.api.search_runs(&request))
            .await
    }

    /// Fetch the page after the last one received. Returns `None` when the
    /// previous search reported no further pages.
    pub async fn load_more_runs(&self, request: &SearchRunsRequest) -> Option<RequestId> {
        let token = self.store.read().await.entities().next_page_token.clone()?;
        let request = SearchRunsRequest {
            page_token: Some(token),
            ..request.clone()
        };
        Some(
            self.track(ActionPayload::LoadMoreRuns, self.api.search_runs(&request))
                .await,
        )
    }

    pub async fn get_metric_history(&self, run_uuid: &str, metric_key: &str) -> RequestId {
        self.track(
            |phase| ActionPayload::GetMetricHistory {
                run_uuid: run_uuid.to_string(),
                metric_key: metric_key.to_string(),
                phase,
            },
            self.api.get_metric_history(run_uuid, metric_key),
        )
        .await
    }

    pub async fn list_artifacts(&self, run_uuid: &str, path: Option<&str>) -> RequestId {
        self.track(
            |phase| ActionPayload::ListArtifacts {
                run_uuid: run_uuid.to_string(),
                path: path.map(str::to_string),
                phase,
            },
            self.api.list_artifacts(run_uuid, path),
        )
        .await
    }

    pub async fn set_tag(&self, target: &TagTarget, key: &str, value: &str) -> RequestId {
        self.track(
            |phase| ActionPayload::SetTag {
                target: target.clone(),
                key: key.to_string(),
                value: value.to_string(),
                phase,
            },
            self.api.set_tag(target, key, value),
        )
        .await
    }

    pub async fn delete_tag(&self, target: &TagTarget, key: &str) -> RequestId {
        self.track(
            |phase| ActionPayload::DeleteTag {
                target: target.clone(),
                key: key.to_string(),
                phase,
            },
            self.api.delete_tag(target, key),
        )
        .await
    }

    pub async fn search_model_versions(&self, filter: &str) -> RequestId {
        self.track(
            ActionPayload::SearchModelVersions,
            self.api.search_model_versions(filter),
        )
        .await
    }

    /// Model versions registered from any of the given runs.
    pub async fn search_model_versions_for_runs(&self, run_uuids: &[String]) -> RequestId {
        self.search_model_versions(&run_id_filter(run_uuids)).await
    }
}

fn run_id_filter(run_uuids: &[String]) -> String {
    let quoted: Vec<String> = run_uuids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "\\'")))
        .collect();
    format!("run_id IN ({})", quoted.join(", "))
}
