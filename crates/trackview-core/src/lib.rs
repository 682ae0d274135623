//! trackview-core: client-side state for browsing experiment-tracking data.
//!
//! Server responses enter as [`Action`]s and are folded into a normalized
//! [`EntityState`] by pure reducers. Views read from the store, ask the
//! [`ApiLifecycle`] whether their requests have settled, and derive
//! comparison tables and plot datasets on demand. The only background work
//! is the [`MetricPoller`] refreshing runs that are still logging.

pub mod actions;
pub mod api;
pub mod artifacts;
pub mod compare;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod legend;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod polling;
pub mod store;

pub use actions::{Action, ActionPayload, Phase, RequestId};
pub use api::{ApiResult, TrackingApi};
pub use artifacts::{normalize_artifact_path, ArtifactNode};
pub use compare::{CompareRow, CompareTable, ContourPlot, PlotData};
pub use config::ClientConfig;
pub use dispatch::Dispatcher;
pub use error::{ApiError, ErrorCode, Result, TrackviewError};
pub use lifecycle::{ApiLifecycle, RequestView};
pub use logging::{init_tracing, LogFormat};
pub use models::{Experiment, Metric, ModelVersion, Run, RunInfo, RunStatus, TagTarget};
pub use polling::{MetricPoller, PollState, PollerHandle};
pub use store::{EntityState, SharedStore, Store};
