//! Async driver around the pure state machine.
//!
//! The driver owns the only copy of the run state. Each accepted event
//! produces a new immutable [`Snapshot`] that is broadcast to subscribers, and
//! the single effect returned by the transition runs on a spawned task whose
//! completion is fed back as the next event. Completions are tagged with the
//! run they belong to and discarded once that run is reset or torn down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use shared::{
    error::{FailureKind, FailureReport},
    protocol::{unwrap_record_list, RecordListShape},
    sanitize::Sanitizer,
};
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::StageCatalog,
    data_source::DataSource,
    error::OrchestratorError,
    machine::{self, Effect, Event, FetchFailurePolicy, MachineContext, SequenceTiming},
    scheduler::{Scheduler, TokioScheduler},
    state::{Decision, RunState, Snapshot},
};

const DEFAULT_SNAPSHOT_CAPACITY: usize = 256;

pub struct OrchestratorBuilder {
    data_source: Arc<dyn DataSource>,
    sanitizer: Sanitizer,
    catalog: StageCatalog,
    timing: SequenceTiming,
    fetch_failure_policy: FetchFailurePolicy,
    scheduler: Arc<dyn Scheduler>,
    snapshot_capacity: usize,
    runtime: Option<Handle>,
}

impl OrchestratorBuilder {
    pub fn catalog(mut self, catalog: StageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn timing(mut self, timing: SequenceTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn fetch_failure_policy(mut self, policy: FetchFailurePolicy) -> Self {
        self.fetch_failure_policy = policy;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn snapshot_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_capacity = capacity.max(1);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Uses the current tokio runtime unless one was supplied.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| OrchestratorError::NoRuntime)?,
        };
        let context = MachineContext {
            catalog: self.catalog,
            timing: self.timing,
            sanitizer: self.sanitizer,
            fetch_failure_policy: self.fetch_failure_policy,
        };
        let (events, _) = broadcast::channel(self.snapshot_capacity);
        let snapshot = Arc::new(RunState::idle(&context.catalog));

        Ok(Orchestrator {
            shared: Arc::new(Shared {
                context,
                data_source: self.data_source,
                scheduler: self.scheduler,
                runtime,
                inner: Mutex::new(DriverState {
                    snapshot,
                    pending: None,
                    events: Some(events),
                }),
            }),
        })
    }
}

/// Drives one conversation at a time. Dropping it cancels whatever timer or
/// backend call is outstanding.
pub struct Orchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    context: MachineContext,
    data_source: Arc<dyn DataSource>,
    scheduler: Arc<dyn Scheduler>,
    runtime: Handle,
    inner: Mutex<DriverState>,
}

struct DriverState {
    snapshot: Snapshot,
    pending: Option<JoinHandle<()>>,
    /// `None` once shut down; dropping the sender closes every receiver.
    events: Option<broadcast::Sender<Snapshot>>,
}

impl Orchestrator {
    pub fn builder(data_source: Arc<dyn DataSource>, sanitizer: Sanitizer) -> OrchestratorBuilder {
        OrchestratorBuilder {
            data_source,
            sanitizer,
            catalog: StageCatalog::idoc_triage(),
            timing: SequenceTiming::default(),
            fetch_failure_policy: FetchFailurePolicy::default(),
            scheduler: Arc::new(TokioScheduler),
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            runtime: None,
        }
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.shared.context.catalog
    }

    pub fn timing(&self) -> SequenceTiming {
        self.shared.context.timing
    }

    /// Receives every snapshot published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        match &self.shared.lock().events {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).0.subscribe(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.shared.lock().snapshot)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().events.is_none()
    }

    /// Begins a run: fetches the backlog and, if it has records, plays the stages.
    pub fn start(&self) -> Result<Snapshot, OrchestratorError> {
        let mut inner = self.shared.lock();
        self.shared.apply(
            &mut inner,
            Event::Start {
                run_id: Uuid::new_v4(),
            },
        )
    }

    pub fn decide(&self, decision: Decision) -> Result<Snapshot, OrchestratorError> {
        let mut inner = self.shared.lock();
        self.shared.apply(&mut inner, Event::Decide(decision))
    }

    /// Returns to idle, cancelling the outstanding timer or call. Backlog
    /// counts survive until the next `start`.
    pub fn reset(&self) -> Result<Snapshot, OrchestratorError> {
        let mut inner = self.shared.lock();
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
        self.shared.apply(&mut inner, Event::Reset)
    }

    /// Cancels pending work and stops publishing. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.shared.lock();
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
        if inner.events.take().is_some() {
            info!(run_id = ?inner.snapshot.run_id, "orchestrator shut down");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(
        self: &Arc<Self>,
        inner: &mut DriverState,
        event: Event,
    ) -> Result<Snapshot, OrchestratorError> {
        let Some(events) = inner.events.as_ref() else {
            return Err(OrchestratorError::ShutDown);
        };

        let event_name = event.name();
        let transition = machine::transition(&inner.snapshot, event, &self.context)?;
        log_transition(&inner.snapshot, &transition.state, event_name);

        let snapshot = Arc::new(transition.state);
        inner.snapshot = Arc::clone(&snapshot);
        // No subscribers is fine; the latest snapshot stays readable.
        let _ = events.send(Arc::clone(&snapshot));

        if let (Some(effect), Some(run_id)) = (transition.effect, snapshot.run_id) {
            inner.pending = Some(self.spawn_effect(run_id, effect));
        }
        Ok(snapshot)
    }

    fn spawn_effect(self: &Arc<Self>, run_id: Uuid, effect: Effect) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let event = shared.perform(run_id, effect).await;
            shared.complete(run_id, event);
        })
    }

    async fn perform(&self, run_id: Uuid, effect: Effect) -> Event {
        match effect {
            Effect::Schedule { delay, timer } => {
                self.scheduler.sleep(delay).await;
                Event::TimerFired(timer)
            }
            Effect::FetchBacklog => {
                let result = self
                    .data_source
                    .fetch_backlog()
                    .await
                    .map(|mut response| {
                        let raw = std::mem::take(&mut response.failed_records);
                        let items = unwrap_and_inspect(run_id, "backlog", raw);
                        response.failed_records = Value::Array(items);
                        response
                    })
                    .map_err(|error| {
                        warn!(%run_id, %error, "backlog fetch failed");
                        FailureReport::new(FailureKind::FetchFailure, error.to_string())
                    });
                Event::BacklogFetched(result)
            }
            Effect::SubmitReconciliation => {
                let result = self
                    .data_source
                    .submit_reconciliation()
                    .await
                    .map(|response| response.results)
                    .map_err(|error| {
                        warn!(%run_id, %error, "reconciliation update failed");
                        FailureReport::new(FailureKind::UpdateFailure, error.to_string())
                    });
                Event::ReconciliationSubmitted(result)
            }
            Effect::FetchReconciledBacklog => {
                let result = self
                    .data_source
                    .fetch_reconciled_backlog()
                    .await
                    .map(|body| unwrap_and_inspect(run_id, "reconciled backlog", body))
                    .map_err(|error| {
                        warn!(%run_id, %error, "reconciled backlog fetch failed");
                        FailureReport::new(FailureKind::ReconciledFetchFailure, error.to_string())
                    });
                Event::ReconciledBacklogFetched(result)
            }
        }
    }

    fn complete(self: &Arc<Self>, run_id: Uuid, event: Event) {
        let mut inner = self.lock();
        if inner.events.is_none() || inner.snapshot.run_id != Some(run_id) {
            debug!(%run_id, event = event.name(), "discarding completion for a finished run");
            return;
        }

        // The finishing task is the pending one; clear it before a successor is spawned.
        inner.pending = None;
        if let Err(error) = self.apply(&mut inner, event) {
            warn!(%run_id, %error, "completion rejected by state machine");
        }
    }
}

/// Pulls the record list out of `body`, logging anything that will not become a record.
fn unwrap_and_inspect(run_id: Uuid, source: &'static str, body: Value) -> Vec<Value> {
    let (items, shape) = unwrap_record_list(body);
    match record_list_problem(&shape, &items) {
        Some(problem) => warn!(%run_id, source, %problem, "unusable records in response"),
        None => debug!(%run_id, source, ?shape, records = items.len(), "record list received"),
    }
    items
}

fn record_list_problem(shape: &RecordListShape, items: &[Value]) -> Option<String> {
    if let RecordListShape::Unrecognized(seen) = shape {
        return Some(format!("no record list in {seen}; using empty"));
    }
    let dropped = items.iter().filter(|item| !item.is_object()).count();
    (dropped > 0).then(|| {
        format!(
            "dropping {dropped} of {} entries that are not objects",
            items.len()
        )
    })
}

fn log_transition(previous: &RunState, next: &RunState, event: &'static str) {
    let run_id = next.run_id.or(previous.run_id);
    if previous.phase != next.phase {
        info!(
            run_id = ?run_id,
            event,
            from = ?previous.phase,
            to = ?next.phase,
            outcome = ?next.outcome,
            "phase changed"
        );
    }
    for (before, after) in previous.stages.iter().zip(&next.stages) {
        if before.status != after.status {
            debug!(
                run_id = ?run_id,
                stage = %after.name,
                visible = after.status.visible,
                loading = after.status.loading,
                "stage status changed"
            );
        }
    }
    if next.failures.len() > previous.failures.len() {
        for failure in &next.failures[previous.failures.len()..] {
            warn!(
                run_id = ?run_id,
                kind = ?failure.kind,
                message = %failure.message,
                "failure recorded"
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
