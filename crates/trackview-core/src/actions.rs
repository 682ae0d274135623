//! Every action the store understands.
//!
//! Each asynchronous call produces up to two actions sharing one request id:
//! a `Pending` one when the call starts and a `Fulfilled` or `Rejected` one
//! when it resolves. Only fulfilled actions change entity state; all three
//! feed the lifecycle tracker.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    ArtifactListing, Experiment, Metric, ModelVersion, Run, SearchRunsPage, TagTarget,
};

/// Caller-supplied identifier of one asynchronous request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of one asynchronous request.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase<T> {
    Pending,
    Fulfilled(T),
    Rejected(ApiError),
}

impl<T> Phase<T> {
    pub fn fulfilled(&self) -> Option<&T> {
        match self {
            Phase::Fulfilled(v) => Some(v),
            _ => None,
        }
    }

    pub fn from_result(result: std::result::Result<T, ApiError>) -> Self {
        match result {
            Ok(v) => Phase::Fulfilled(v),
            Err(e) => Phase::Rejected(e),
        }
    }
}

impl<T: Serialize> Phase<T> {
    fn event(&self) -> PhaseEvent<'_> {
        match self {
            Phase::Pending => PhaseEvent::Pending,
            Phase::Fulfilled(v) => PhaseEvent::Fulfilled(snapshot(v)),
            Phase::Rejected(e) => PhaseEvent::Rejected(e),
        }
    }
}

/// JSON copy of a fulfilled payload; `Null` if it cannot be serialized.
fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to record fulfilled payload");
        serde_json::Value::Null
    })
}

/// What the lifecycle tracker sees of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent<'a> {
    Pending,
    Fulfilled(serde_json::Value),
    Rejected(&'a ApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    ListExperiments(Phase<Vec<Experiment>>),
    GetExperiment {
        experiment_id: String,
        phase: Phase<Experiment>,
    },
    GetRun {
        run_uuid: String,
        phase: Phase<Run>,
    },
    SearchRuns(Phase<SearchRunsPage>),
    LoadMoreRuns(Phase<SearchRunsPage>),
    GetMetricHistory {
        run_uuid: String,
        metric_key: String,
        phase: Phase<Vec<Metric>>,
    },
    ListArtifacts {
        run_uuid: String,
        path: Option<String>,
        phase: Phase<ArtifactListing>,
    },
    SetTag {
        target: TagTarget,
        key: String,
        value: String,
        phase: Phase<()>,
    },
    DeleteTag {
        target: TagTarget,
        key: String,
        phase: Phase<()>,
    },
    SearchModelVersions(Phase<Vec<ModelVersion>>),
}

impl ActionPayload {
    pub fn name(&self) -> &'static str {
        match self {
            ActionPayload::ListExperiments(_) => "list_experiments",
            ActionPayload::GetExperiment { .. } => "get_experiment",
            ActionPayload::GetRun { .. } => "get_run",
            ActionPayload::SearchRuns(_) => "search_runs",
            ActionPayload::LoadMoreRuns(_) => "load_more_runs",
            ActionPayload::GetMetricHistory { .. } => "get_metric_history",
            ActionPayload::ListArtifacts { .. } => "list_artifacts",
            ActionPayload::SetTag { .. } => "set_tag",
            ActionPayload::DeleteTag { .. } => "delete_tag",
            ActionPayload::SearchModelVersions(_) => "search_model_versions",
        }
    }

    pub fn phase_event(&self) -> PhaseEvent<'_> {
        match self {
            ActionPayload::ListExperiments(p) => p.event(),
            ActionPayload::GetExperiment { phase, .. } => phase.event(),
            ActionPayload::GetRun { phase, .. } => phase.event(),
            ActionPayload::SearchRuns(p) | ActionPayload::LoadMoreRuns(p) => p.event(),
            ActionPayload::GetMetricHistory { phase, .. } => phase.event(),
            ActionPayload::ListArtifacts { phase, .. } => phase.event(),
            ActionPayload::SetTag { phase, .. } | ActionPayload::DeleteTag { phase, .. } => {
                phase.event()
            }
            ActionPayload::SearchModelVersions(p) => p.event(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub request_id: Option<RequestId>,
    pub payload: ActionPayload,
}

impl Action {
    pub fn new(request_id: RequestId, payload: ActionPayload) -> Self {
        Self {
            request_id: Some(request_id),
            payload,
        }
    }

    /// An action that bypasses the lifecycle tracker.
    pub fn untracked(payload: ActionPayload) -> Self {
        Self {
            request_id: None,
            payload,
        }
    }
}
