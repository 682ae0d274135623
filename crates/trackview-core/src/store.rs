//! Normalized entity cache and the store object that owns it.
//!
//! `EntityState::reduce` is a pure transition: it never performs I/O and
//! every slice it touches is rebuilt and swapped in whole. `Store` combines
//! the entity state with the lifecycle tracker and a notification queue and
//! is what applications construct and share.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::actions::{Action, ActionPayload, Phase, RequestId};
use crate::artifacts::{model_versions_for_artifact, ArtifactNode};
use crate::error::Result;
use crate::lifecycle::ApiLifecycle;
use crate::models::{
    ArtifactListing, Experiment, KeyValue, Metric, ModelVersion, Run, RunInfo, SearchRunsPage,
    TagTarget,
};

type KeyedValues = HashMap<String, HashMap<String, KeyValue>>;
type KeyedMetrics = HashMap<String, HashMap<String, Metric>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub experiments_by_id: HashMap<String, Experiment>,
    pub experiment_tags_by_id: KeyedValues,
    pub runs_by_uuid: HashMap<String, RunInfo>,
    pub params_by_run_uuid: KeyedValues,
    pub tags_by_run_uuid: KeyedValues,
    pub latest_metrics_by_run_uuid: KeyedMetrics,
    pub min_metrics_by_run_uuid: KeyedMetrics,
    pub max_metrics_by_run_uuid: KeyedMetrics,
    /// run uuid -> metric key -> full history, ordered by step then timestamp
    pub metric_history_by_run_uuid: HashMap<String, HashMap<String, Vec<Metric>>>,
    pub artifacts_by_run_uuid: HashMap<String, ArtifactNode>,
    pub artifact_root_uri_by_run_uuid: HashMap<String, String>,
    pub model_versions_by_run_uuid: HashMap<String, Vec<ModelVersion>>,
    pub next_page_token: Option<String>,
}

fn keyed(values: &[KeyValue]) -> HashMap<String, KeyValue> {
    values.iter().map(|kv| (kv.key.clone(), kv.clone())).collect()
}

/// Drop `key` under `run_uuid`, and the run entry once it is empty.
fn remove_key(metrics: &mut KeyedMetrics, run_uuid: &str, key: &str) {
    if let Some(m) = metrics.get_mut(run_uuid) {
        m.remove(key);
        if m.is_empty() {
            metrics.remove(run_uuid);
        }
    }
}

fn latest_per_key(metrics: &[Metric]) -> HashMap<String, Metric> {
    let mut out: HashMap<String, Metric> = HashMap::new();
    for m in metrics {
        let newer = out
            .get(&m.key)
            .map_or(true, |prev| (m.step, m.timestamp) >= (prev.step, prev.timestamp));
        if newer {
            out.insert(m.key.clone(), m.clone());
        }
    }
    out
}

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action. On error nothing has been changed.
    pub fn reduce(&mut self, action: &Action) -> Result<()> {
        match &action.payload {
            ActionPayload::ListExperiments(phase) => {
                if let Some(experiments) = phase.fulfilled() {
                    self.replace_experiments(experiments);
                }
            }
            ActionPayload::GetExperiment { phase, .. } => {
                if let Some(experiment) = phase.fulfilled() {
                    self.reconcile_experiment(experiment);
                }
            }
            ActionPayload::GetRun { phase, .. } => {
                if let Some(run) = phase.fulfilled() {
                    let mut runs = self.runs_by_uuid.clone();
                    runs.insert(run.info.run_uuid.clone(), run.info.clone());
                    self.runs_by_uuid = runs;
                    self.replace_run_data(std::slice::from_ref(run));
                }
            }
            ActionPayload::SearchRuns(phase) => {
                if let Some(page) = phase.fulfilled() {
                    self.runs_by_uuid = page
                        .runs
                        .iter()
                        .map(|r| (r.info.run_uuid.clone(), r.info.clone()))
                        .collect();
                    self.replace_run_data(&page.runs);
                    self.next_page_token = page.next_page_token.clone();
                }
            }
            ActionPayload::LoadMoreRuns(phase) => {
                if let Some(page) = phase.fulfilled() {
                    self.append_runs(page);
                }
            }
            ActionPayload::GetMetricHistory {
                run_uuid,
                metric_key,
                phase,
            } => {
                if let Some(history) = phase.fulfilled() {
                    self.replace_metric_history(run_uuid, metric_key, history);
                }
            }
            ActionPayload::ListArtifacts {
                run_uuid,
                path,
                phase,
            } => {
                if let Some(listing) = phase.fulfilled() {
                    self.update_artifacts(run_uuid, path.as_deref(), listing)?;
                }
            }
            ActionPayload::SetTag {
                target,
                key,
                value,
                phase: Phase::Fulfilled(()),
            } => {
                let (map, owner) = self.tag_map(target);
                let mut tags = map.clone();
                tags.entry(owner.to_string())
                    .or_default()
                    .insert(key.clone(), KeyValue::new(key.clone(), value.clone()));
                self.set_tag_map(target, tags);
            }
            ActionPayload::DeleteTag {
                target,
                key,
                phase: Phase::Fulfilled(()),
            } => {
                let (map, owner) = self.tag_map(target);
                let mut tags = map.clone();
                if let Some(owned) = tags.get_mut(owner) {
                    owned.remove(key);
                    if owned.is_empty() {
                        tags.remove(owner);
                    }
                }
                self.set_tag_map(target, tags);
            }
            ActionPayload::SetTag { .. } | ActionPayload::DeleteTag { .. } => {}
            ActionPayload::SearchModelVersions(phase) => {
                if let Some(versions) = phase.fulfilled() {
                    let mut by_run: HashMap<String, Vec<ModelVersion>> = HashMap::new();
                    for mv in versions {
                        by_run.entry(mv.run_id.clone()).or_default().push(mv.clone());
                    }
                    self.model_versions_by_run_uuid = by_run;
                }
            }
        }
        Ok(())
    }

    fn replace_experiments(&mut self, experiments: &[Experiment]) {
        let mut tags = HashMap::new();
        let mut by_id = HashMap::with_capacity(experiments.len());
        for exp in experiments {
            if let Some(t) = exp.tags.as_deref().filter(|t| !t.is_empty()) {
                tags.insert(exp.experiment_id.clone(), keyed(t));
            }
            by_id.insert(
                exp.experiment_id.clone(),
                Experiment {
                    tags: None,
                    ..exp.clone()
                },
            );
        }
        self.experiments_by_id = by_id;
        self.experiment_tags_by_id = tags;
    }

    fn reconcile_experiment(&mut self, incoming: &Experiment) {
        let id = incoming.experiment_id.clone();
        let merged = match self.experiments_by_id.get(&id) {
            Some(existing) => existing.reconcile(incoming.clone()),
            None => Experiment {
                tags: None,
                ..incoming.clone()
            },
        };
        let mut by_id = self.experiments_by_id.clone();
        by_id.insert(id.clone(), merged);
        self.experiments_by_id = by_id;

        if let Some(t) = &incoming.tags {
            let mut tags = self.experiment_tags_by_id.clone();
            if t.is_empty() {
                tags.remove(&id);
            } else {
                tags.insert(id, keyed(t));
            }
            self.experiment_tags_by_id = tags;
        }
    }

    fn replace_run_data(&mut self, runs: &[Run]) {
        let mut params = self.params_by_run_uuid.clone();
        let mut tags = self.tags_by_run_uuid.clone();
        let mut latest = self.latest_metrics_by_run_uuid.clone();
        let mut roots = self.artifact_root_uri_by_run_uuid.clone();
        for run in runs {
            let uuid = &run.info.run_uuid;
            params.insert(uuid.clone(), keyed(&run.data.params));
            if run.data.tags.is_empty() {
                tags.remove(uuid);
            } else {
                tags.insert(uuid.clone(), keyed(&run.data.tags));
            }
            latest.insert(uuid.clone(), latest_per_key(&run.data.metrics));
            if let Some(uri) = &run.info.artifact_uri {
                roots.insert(uuid.clone(), uri.clone());
            }
        }
        self.params_by_run_uuid = params;
        self.tags_by_run_uuid = tags;
        self.latest_metrics_by_run_uuid = latest;
        self.artifact_root_uri_by_run_uuid = roots;
    }

    fn append_runs(&mut self, page: &SearchRunsPage) {
        let mut runs = self.runs_by_uuid.clone();
        for r in &page.runs {
            runs.insert(r.info.run_uuid.clone(), r.info.clone());
        }
        self.runs_by_uuid = runs;
        self.replace_run_data(&page.runs);
        self.next_page_token = page.next_page_token.clone();
    }

    fn replace_metric_history(&mut self, run_uuid: &str, key: &str, history: &[Metric]) {
        let mut sorted = history.to_vec();
        sorted.sort_by(|a, b| (a.step, a.timestamp).cmp(&(b.step, b.timestamp)));

        let mut all = self.metric_history_by_run_uuid.clone();
        all.entry(run_uuid.to_string())
            .or_default()
            .insert(key.to_string(), sorted.clone());

        let mut min = self.min_metrics_by_run_uuid.clone();
        let mut max = self.max_metrics_by_run_uuid.clone();
        let mut latest = self.latest_metrics_by_run_uuid.clone();
        let lowest = sorted
            .iter()
            .filter(|m| !m.value.is_nan())
            .min_by(|a, b| a.value.total_cmp(&b.value));
        let highest = sorted
            .iter()
            .filter(|m| !m.value.is_nan())
            .max_by(|a, b| a.value.total_cmp(&b.value));
        match (lowest, highest) {
            (Some(lo), Some(hi)) => {
                min.entry(run_uuid.to_string()).or_default().insert(key.to_string(), lo.clone());
                max.entry(run_uuid.to_string()).or_default().insert(key.to_string(), hi.clone());
            }
            _ => {
                remove_key(&mut min, run_uuid, key);
                remove_key(&mut max, run_uuid, key);
            }
        }
        match sorted.last() {
            Some(last) => {
                latest
                    .entry(run_uuid.to_string())
                    .or_default()
                    .insert(key.to_string(), last.clone());
            }
            None => remove_key(&mut latest, run_uuid, key),
        }

        self.metric_history_by_run_uuid = all;
        self.min_metrics_by_run_uuid = min;
        self.max_metrics_by_run_uuid = max;
        self.latest_metrics_by_run_uuid = latest;
    }

    fn update_artifacts(
        &mut self,
        run_uuid: &str,
        path: Option<&str>,
        listing: &ArtifactListing,
    ) -> Result<()> {
        let tree = match self.artifacts_by_run_uuid.get(run_uuid) {
            Some(existing) => existing.with_listing(run_uuid, path, &listing.files)?,
            None => ArtifactNode::root().with_listing(run_uuid, path, &listing.files)?,
        };
        let mut trees = self.artifacts_by_run_uuid.clone();
        trees.insert(run_uuid.to_string(), tree);
        self.artifacts_by_run_uuid = trees;

        if let Some(root) = &listing.root_uri {
            let mut roots = self.artifact_root_uri_by_run_uuid.clone();
            roots.insert(run_uuid.to_string(), root.clone());
            self.artifact_root_uri_by_run_uuid = roots;
        }
        Ok(())
    }

    fn tag_map<'a>(&self, target: &'a TagTarget) -> (&KeyedValues, &'a str) {
        match target {
            TagTarget::Run(id) => (&self.tags_by_run_uuid, id),
            TagTarget::Experiment(id) => (&self.experiment_tags_by_id, id),
        }
    }

    fn set_tag_map(&mut self, target: &TagTarget, tags: KeyedValues) {
        match target {
            TagTarget::Run(_) => self.tags_by_run_uuid = tags,
            TagTarget::Experiment(_) => self.experiment_tags_by_id = tags,
        }
    }

    // ─── Selectors ──────────────────────────────────────────────────────────

    /// Experiments ordered by id.
    pub fn experiments(&self) -> Vec<&Experiment> {
        let mut list: Vec<&Experiment> = self.experiments_by_id.values().collect();
        list.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        list
    }

    pub fn experiment(&self, id: &str) -> Option<&Experiment> {
        self.experiments_by_id.get(id)
    }

    pub fn run(&self, run_uuid: &str) -> Option<&RunInfo> {
        self.runs_by_uuid.get(run_uuid)
    }

    /// Runs of an experiment, newest start time first.
    pub fn runs_for_experiment(&self, experiment_id: &str) -> Vec<&RunInfo> {
        let mut runs: Vec<&RunInfo> = self
            .runs_by_uuid
            .values()
            .filter(|r| r.experiment_id == experiment_id)
            .collect();
        runs.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.run_uuid.cmp(&b.run_uuid))
        });
        runs
    }

    pub fn params(&self, run_uuid: &str) -> Option<&HashMap<String, KeyValue>> {
        self.params_by_run_uuid.get(run_uuid)
    }

    pub fn run_tags(&self, run_uuid: &str) -> Option<&HashMap<String, KeyValue>> {
        self.tags_by_run_uuid.get(run_uuid)
    }

    pub fn experiment_tags(&self, experiment_id: &str) -> Option<&HashMap<String, KeyValue>> {
        self.experiment_tags_by_id.get(experiment_id)
    }

    pub fn latest_metrics(&self, run_uuid: &str) -> Option<&HashMap<String, Metric>> {
        self.latest_metrics_by_run_uuid.get(run_uuid)
    }

    pub fn metric_history(&self, run_uuid: &str, key: &str) -> Option<&[Metric]> {
        self.metric_history_by_run_uuid
            .get(run_uuid)?
            .get(key)
            .map(Vec::as_slice)
    }

    pub fn min_metric(&self, run_uuid: &str, key: &str) -> Option<&Metric> {
        self.min_metrics_by_run_uuid.get(run_uuid)?.get(key)
    }

    pub fn max_metric(&self, run_uuid: &str, key: &str) -> Option<&Metric> {
        self.max_metrics_by_run_uuid.get(run_uuid)?.get(key)
    }

    /// Most recent metric timestamp logged by a run, across all keys.
    pub fn latest_metric_timestamp(&self, run_uuid: &str) -> Option<i64> {
        self.latest_metrics_by_run_uuid
            .get(run_uuid)?
            .values()
            .map(|m| m.timestamp)
            .max()
    }

    pub fn artifact_tree(&self, run_uuid: &str) -> Option<&ArtifactNode> {
        self.artifacts_by_run_uuid.get(run_uuid)
    }

    pub fn model_versions(&self, run_uuid: &str) -> &[ModelVersion] {
        self.model_versions_by_run_uuid
            .get(run_uuid)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Registered model versions whose source is the artifact at `path`.
    pub fn model_versions_at(&self, run_uuid: &str, path: &str) -> Vec<&ModelVersion> {
        match self.artifact_root_uri_by_run_uuid.get(run_uuid) {
            Some(root) => model_versions_for_artifact(self.model_versions(run_uuid), root, path),
            None => vec![],
        }
    }
}

/// A message for the user about a state update that could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub action: &'static str,
    pub message: String,
}

/// The application's state container.
#[derive(Debug, Default)]
pub struct Store {
    entities: EntityState,
    lifecycle: ApiLifecycle,
    notifications: VecDeque<Notification>,
}

pub type SharedStore = Arc<RwLock<Store>>;

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Feed an action through the lifecycle tracker and entity reducer.
    ///
    /// Reducer faults never propagate: the entity update is dropped, the
    /// previous state kept and a notification queued.
    pub fn dispatch(&mut self, action: &Action) {
        debug!(action = action.payload.name(), request = ?action.request_id, "dispatch");
        self.lifecycle.apply(action);
        if let Err(e) = self.entities.reduce(action) {
            warn!(action = action.payload.name(), error = %e, "Dropped state update");
            self.notifications.push_back(Notification {
                action: action.payload.name(),
                message: e.to_string(),
            });
        }
    }

    pub fn entities(&self) -> &EntityState {
        &self.entities
    }

    pub fn lifecycle(&self) -> &ApiLifecycle {
        &self.lifecycle
    }

    /// Drop lifecycle entries nobody will read again.
    pub fn forget_requests(&mut self, ids: &[RequestId]) {
        for id in ids {
            self.lifecycle.remove(id);
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// Drop every cached entity, request and notification.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
