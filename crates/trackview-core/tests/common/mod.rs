//! In-memory tracking server shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use trackview_core::api::{ApiResult, TrackingApi};
use trackview_core::dispatch::Dispatcher;
use trackview_core::error::ApiError;
use trackview_core::models::{
    ArtifactListing, Experiment, KeyValue, Metric, ModelVersion, Run, RunData, RunInfo, RunStatus,
    SearchRunsPage, SearchRunsRequest, TagTarget,
};
use trackview_core::store::Store;

#[derive(Default)]
pub struct MockApi {
    pub experiments: Mutex<Vec<Experiment>>,
    pub runs: Mutex<HashMap<String, Run>>,
    pub pages: Mutex<HashMap<Option<String>, SearchRunsPage>>,
    pub histories: Mutex<HashMap<(String, String), Vec<Metric>>>,
    pub artifacts: Mutex<HashMap<(String, String), ArtifactListing>>,
    pub model_versions: Mutex<Vec<ModelVersion>>,
    pub fail_with: Mutex<Option<ApiError>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: String) -> ApiResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.fail_with.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn put_run(&self, run: Run) {
        self.runs.lock().unwrap().insert(run.info.run_uuid.clone(), run);
    }

    pub fn put_history(&self, run_uuid: &str, key: &str, history: Vec<Metric>) {
        self.histories
            .lock()
            .unwrap()
            .insert((run_uuid.to_string(), key.to_string()), history);
    }
}

#[async_trait]
impl TrackingApi for MockApi {
    async fn list_experiments(&self) -> ApiResult<Vec<Experiment>> {
        self.record("list_experiments".into())?;
        Ok(self.experiments.lock().unwrap().clone())
    }

    async fn get_experiment(&self, experiment_id: &str) -> ApiResult<Experiment> {
        self.record(format!("get_experiment:{experiment_id}"))?;
        self.experiments
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.experiment_id == experiment_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Experiment {experiment_id} not found")))
    }

    async fn get_run(&self, run_uuid: &str) -> ApiResult<Run> {
        self.record(format!("get_run:{run_uuid}"))?;
        self.runs
            .lock()
            .unwrap()
            .get(run_uuid)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Run {run_uuid} not found")))
    }

    async fn search_runs(&self, request: &SearchRunsRequest) -> ApiResult<SearchRunsPage> {
        self.record(format!("search_runs:{:?}", request.page_token))?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&request.page_token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_metric_history(&self, run_uuid: &str, metric_key: &str) -> ApiResult<Vec<Metric>> {
        self.record(format!("get_metric_history:{run_uuid}:{metric_key}"))?;
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(&(run_uuid.to_string(), metric_key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_artifacts(&self, run_uuid: &str, path: Option<&str>) -> ApiResult<ArtifactListing> {
        let path = path.unwrap_or("").to_string();
        self.record(format!("list_artifacts:{run_uuid}:{path}"))?;
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(&(run_uuid.to_string(), path))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_tag(&self, target: &TagTarget, key: &str, _value: &str) -> ApiResult<()> {
        self.record(format!("set_tag:{target:?}:{key}"))
    }

    async fn delete_tag(&self, target: &TagTarget, key: &str) -> ApiResult<()> {
        self.record(format!("delete_tag:{target:?}:{key}"))
    }

    async fn search_model_versions(&self, filter: &str) -> ApiResult<Vec<ModelVersion>> {
        self.record(format!("search_model_versions:{filter}"))?;
        Ok(self.model_versions.lock().unwrap().clone())
    }
}

pub fn dispatcher(api: Arc<MockApi>) -> Dispatcher<MockApi> {
    Dispatcher::new(api, Store::new().shared())
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn run(uuid: &str, experiment_id: &str, status: RunStatus) -> Run {
    Run {
        info: RunInfo::new(uuid, experiment_id, status),
        data: RunData::default(),
    }
}

/// A run whose only metric `loss` was logged `age_ms` ago.
pub fn run_with_metric_age(uuid: &str, status: RunStatus, age_ms: i64) -> Run {
    let mut r = run(uuid, "0", status);
    r.data.metrics = vec![Metric::new("loss", 0.5, now_ms() - age_ms, 1)];
    r
}

pub fn run_with_data(uuid: &str, params: &[(&str, &str)], metrics: &[(&str, f64)]) -> Run {
    let mut r = run(uuid, "0", RunStatus::Finished);
    r.data.params = params.iter().map(|(k, v)| KeyValue::new(*k, *v)).collect();
    r.data.metrics = metrics
        .iter()
        .map(|(k, v)| Metric::new(*k, *v, 1_000, 0))
        .collect();
    r
}
