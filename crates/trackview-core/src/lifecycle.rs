//! Request lifecycle tracking: request id to pending/fulfilled/rejected.

use std::collections::HashMap;

use serde::Serialize;

use crate::actions::{Action, PhaseEvent, RequestId};
use crate::error::ApiError;

/// Status of one tracked request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestState {
    pub id: RequestId,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// How a view should render given the requests it depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestView {
    Loading,
    NotFound(String),
    Failed(String),
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct ApiLifecycle {
    requests: HashMap<RequestId, RequestState>,
}

impl ApiLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the phase of `action`. Actions without a request id are ignored.
    pub fn apply(&mut self, action: &Action) {
        let Some(id) = action.request_id.clone() else {
            return;
        };
        let state = match action.payload.phase_event() {
            PhaseEvent::Pending => RequestState {
                id: id.clone(),
                active: true,
                data: None,
                error: None,
            },
            PhaseEvent::Fulfilled(data) => RequestState {
                id: id.clone(),
                active: false,
                data: Some(data),
                error: None,
            },
            PhaseEvent::Rejected(err) => RequestState {
                id: id.clone(),
                active: false,
                data: None,
                error: Some(err.clone()),
            },
        };
        self.requests.insert(id, state);
    }

    pub fn get(&self, id: &RequestId) -> Option<&RequestState> {
        self.requests.get(id)
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<RequestState> {
        self.requests.remove(id)
    }

    /// Keep only the requests for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&RequestState) -> bool) {
        self.requests.retain(|_, state| keep(state));
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// True once every listed request is known and no longer active.
    pub fn all_complete(&self, ids: &[RequestId]) -> bool {
        ids.iter()
            .all(|id| self.requests.get(id).is_some_and(|r| !r.active))
    }

    pub fn first_error(&self, ids: &[RequestId]) -> Option<&ApiError> {
        ids.iter()
            .filter_map(|id| self.requests.get(id))
            .find_map(|r| r.error.as_ref())
    }

    /// Collapse the listed requests into one rendering decision. Errors win
    /// over in-flight requests so a failure is shown as soon as it happens.
    pub fn view(&self, ids: &[RequestId]) -> RequestView {
        if let Some(err) = self.first_error(ids) {
            return if err.is_not_found() {
                RequestView::NotFound(err.message.clone())
            } else {
                RequestView::Failed(err.message.clone())
            };
        }
        if self.all_complete(ids) {
            RequestView::Ready
        } else {
            RequestView::Loading
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}
