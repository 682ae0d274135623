//! Live metric polling for runs that are still logging.
//!
//! A poller is spawned per mounted plot view. It refreshes the selected runs
//! on a fixed interval while the window has focus, and stops for good once
//! none of them is active any more. A run is active when its status is not
//! terminal and it is not hanging, i.e. it logged a metric within the
//! staleness threshold.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::actions::RequestId;
use crate::api::TrackingApi;
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::store::EntityState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Stopped,
}

/// A run reported running whose latest metric is older than `threshold`.
/// Runs that never logged a metric are not hanging.
pub fn is_hanging(latest_metric_ts: Option<i64>, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
    match latest_metric_ts {
        Some(ts) => now.timestamp_millis() - ts > threshold.num_milliseconds(),
        None => false,
    }
}

/// The subset of `run_uuids` that should still be polled. Runs missing from
/// the store are treated as inactive.
pub fn active_runs(
    entities: &EntityState,
    run_uuids: &[String],
    now: DateTime<Utc>,
    threshold: chrono::Duration,
) -> Vec<String> {
    run_uuids
        .iter()
        .filter(|uuid| {
            entities.run(uuid).is_some_and(|info| {
                !info.status.is_terminal()
                    && !is_hanging(entities.latest_metric_timestamp(uuid), now, threshold)
            })
        })
        .cloned()
        .collect()
}

#[derive(Debug)]
enum PollCommand {
    Focus,
    Blur,
    Stop,
}

/// Handle to a running poller. Dropping it stops the poller.
pub struct PollerHandle {
    commands: mpsc::UnboundedSender<PollCommand>,
    state: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn focus(&self) {
        let _ = self.commands.send(PollCommand::Focus);
    }

    pub fn blur(&self) {
        let _ = self.commands.send(PollCommand::Blur);
    }

    /// Stop polling. Calling this on an already stopped poller does nothing.
    pub fn stop(&self) {
        let _ = self.commands.send(PollCommand::Stop);
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Resolve once the poller has stopped, for whatever reason.
    pub async fn stopped(&mut self) {
        let _ = self.state.wait_for(|s| *s == PollState::Stopped).await;
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Polls metric history and run info for a fixed set of runs.
pub struct MetricPoller<A: TrackingApi + 'static> {
    dispatcher: Dispatcher<A>,
    run_uuids: Vec<String>,
    metric_keys: Vec<String>,
    interval: Duration,
    hanging_threshold: chrono::Duration,
}

enum Control {
    Continue,
    Stop,
}

impl<A: TrackingApi + 'static> MetricPoller<A> {
    /// `metric_keys` empty means every key the run has logged so far.
    pub fn new(
        dispatcher: Dispatcher<A>,
        run_uuids: Vec<String>,
        metric_keys: Vec<String>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            dispatcher,
            run_uuids,
            metric_keys,
            interval: config.poll_interval(),
            hanging_threshold: config.hanging_threshold(),
        }
    }

    /// Start polling in a background task. `focused` is the window's focus
    /// state at mount time.
    pub fn spawn(self, focused: bool) -> PollerHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(PollState::Idle);
        let task = tokio::spawn(self.run(receiver, state_tx, focused));
        PollerHandle {
            commands,
            state,
            task: Some(task),
        }
    }

    async fn active(&self) -> Vec<String> {
        let store = self.dispatcher.store().read().await;
        active_runs(store.entities(), &self.run_uuids, Utc::now(), self.hanging_threshold)
    }

    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<PollCommand>,
        state: watch::Sender<PollState>,
        mut focused: bool,
    ) {
        if self.active().await.is_empty() {
            debug!("No active runs, not polling");
            let _ = state.send(PollState::Stopped);
            return;
        }

        let _ = state.send(PollState::Polling);
        info!(runs = self.run_uuids.len(), interval = ?self.interval, "Metric polling started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Requests of the last settled tick; older ones are forgotten.
        let mut previous: Vec<RequestId> = Vec::new();

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => {
                    if let Control::Stop = apply_command(cmd, &mut focused) {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if !focused {
                        trace!("Window unfocused, skipping poll");
                        continue;
                    }
                    let active = self.active().await;
                    if active.is_empty() {
                        break;
                    }

                    let refresh = self.refresh(&active);
                    tokio::pin!(refresh);
                    let mut settled = None;
                    loop {
                        tokio::select! {
                            ids = &mut refresh => {
                                settled = Some(ids);
                                break;
                            }
                            cmd = commands.recv() => {
                                if let Control::Stop = apply_command(cmd, &mut focused) {
                                    break;
                                }
                            }
                        }
                    }
                    let Some(ids) = settled else {
                        break;
                    };
                    self.dispatcher.store().write().await.forget_requests(&previous);
                    previous = ids;

                    if self.active().await.is_empty() {
                        break;
                    }
                }
            }
        }

        info!("Metric polling stopped");
        let _ = state.send(PollState::Stopped);
    }

    /// Re-fetch every active run and return the request ids used. Dropping
    /// the returned future abandons the calls still in flight, so nothing is
    /// dispatched after a stop.
    async fn refresh(&self, active: &[String]) -> Vec<RequestId> {
        let mut calls: Vec<BoxFuture<'static, RequestId>> = Vec::new();
        for run_uuid in active {
            let keys = if self.metric_keys.is_empty() {
                self.logged_keys(run_uuid).await
            } else {
                self.metric_keys.clone()
            };
            debug!(run = %run_uuid, keys = keys.len(), "Polling run");
            for key in keys {
                let dispatcher = self.dispatcher.clone();
                let run_uuid = run_uuid.clone();
                calls.push(
                    async move { dispatcher.get_metric_history(&run_uuid, &key).await }.boxed(),
                );
            }
            let dispatcher = self.dispatcher.clone();
            let run_uuid = run_uuid.clone();
            calls.push(
                async move { dispatcher.get_run(&run_uuid).await }.boxed(),
            );
        }
        join_all(calls).await
    }

    async fn logged_keys(&self, run_uuid: &str) -> Vec<String> {
        let store = self.dispatcher.store().read().await;
        store
            .entities()
            .latest_metrics(run_uuid)
            .map(|m| m.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect())
            .unwrap_or_default()
    }
}

fn apply_command(cmd: Option<PollCommand>, focused: &mut bool) -> Control {
    match cmd {
        None | Some(PollCommand::Stop) => Control::Stop,
        Some(PollCommand::Focus) => {
            *focused = true;
            Control::Continue
        }
        Some(PollCommand::Blur) => {
            *focused = false;
            Control::Continue
        }
    }
}
