//! Data models for entities served by the tracking server.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of an experiment or run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    #[default]
    Active,
    Deleted,
}

/// A named grouping of runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
    #[serde(default)]
    pub lifecycle_stage: Option<LifecycleStage>,
    #[serde(default)]
    pub creation_time: Option<i64>,
    #[serde(default)]
    pub last_update_time: Option<i64>,
    /// Tags as returned by the server. The store moves these into its own
    /// experiment tag map; `None` means the response did not carry tags.
    #[serde(default)]
    pub tags: Option<Vec<KeyValue>>,
}

impl Experiment {
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            artifact_location: None,
            lifecycle_stage: None,
            creation_time: None,
            last_update_time: None,
            tags: None,
        }
    }

    /// Fold a possibly partial single-fetch response into the known record.
    ///
    /// `experiment_id` and `name` are authoritative and always replaced; every
    /// other field is only taken from `incoming` when present there.
    pub fn reconcile(&self, incoming: Experiment) -> Experiment {
        Experiment {
            experiment_id: incoming.experiment_id,
            name: incoming.name,
            artifact_location: incoming
                .artifact_location
                .or_else(|| self.artifact_location.clone()),
            lifecycle_stage: incoming.lifecycle_stage.or(self.lifecycle_stage),
            creation_time: incoming.creation_time.or(self.creation_time),
            last_update_time: incoming.last_update_time.or(self.last_update_time),
            tags: None,
        }
    }
}

/// Status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    /// Whether the run can no longer log new data.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Finished | RunStatus::Failed | RunStatus::Killed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Scheduled => write!(f, "SCHEDULED"),
            RunStatus::Finished => write!(f, "FINISHED"),
            RunStatus::Failed => write!(f, "FAILED"),
            RunStatus::Killed => write!(f, "KILLED"),
        }
    }
}

/// Metadata of a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunInfo {
    pub run_uuid: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: RunStatus,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub artifact_uri: Option<String>,
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
}

impl RunInfo {
    pub fn new(run_uuid: impl Into<String>, experiment_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            run_uuid: run_uuid.into(),
            experiment_id: experiment_id.into(),
            run_name: None,
            user_id: None,
            status,
            start_time: None,
            end_time: None,
            artifact_uri: None,
            lifecycle_stage: LifecycleStage::Active,
        }
    }

    pub fn with_artifact_uri(mut self, uri: impl Into<String>) -> Self {
        self.artifact_uri = Some(uri.into());
        self
    }
}

/// A param or tag: an immutable key/value pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub type Param = KeyValue;
pub type RunTag = KeyValue;
pub type ExperimentTag = KeyValue;

/// A single logged metric point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

impl Metric {
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            step,
        }
    }

    pub fn logged_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Params, tags and latest metrics carried alongside a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunData {
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub tags: Vec<RunTag>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub info: RunInfo,
    #[serde(default)]
    pub data: RunData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchRunsPage {
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Filter and paging arguments for a run search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchRunsRequest {
    pub experiment_ids: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// One entry of an artifact directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Path relative to the run's artifact root, slash separated.
    pub path: String,
    pub is_dir: bool,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl ArtifactFile {
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            file_size: None,
        }
    }

    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            file_size: Some(size),
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArtifactListing {
    #[serde(default)]
    pub root_uri: Option<String>,
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
}

/// A registered model version produced by a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    pub source: String,
    pub run_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<i64>,
}

/// Owner of a tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TagTarget {
    Run(String),
    Experiment(String),
}
