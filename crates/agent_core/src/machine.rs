//! Pure transition function of the staged sequence.
//!
//! `transition` never performs I/O or waits: it maps the current [`RunState`]
//! and one [`Event`] to the next state plus at most one [`Effect`] for the
//! driver to carry out. Because each step yields a single effect, a run never
//! has more than one timer or data source call outstanding.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{records_from_values, Record, ReconciliationResult},
    error::{FailureKind, FailureReport},
    protocol::{parse_count, unwrap_record_list, BacklogResponse},
    sanitize::Sanitizer,
};
use uuid::Uuid;

use crate::{
    catalog::StageCatalog,
    error::OrchestratorError,
    state::{Decision, Outcome, Phase, RunState, StageStatus},
};

pub const DEFAULT_LEAD_IN: Duration = Duration::from_millis(500);
pub const DEFAULT_STAGE_PROCESSING: Duration = Duration::from_millis(2500);
pub const DEFAULT_STAGE_REVEAL: Duration = Duration::from_millis(900);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTiming {
    /// Pause between the backlog arriving and the first stage heading.
    pub lead_in: Duration,
    /// Time a stage spends loading before its result is shown.
    pub stage_processing: Duration,
    /// Pause between a stage finishing and the next heading appearing.
    pub stage_reveal: Duration,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            lead_in: DEFAULT_LEAD_IN,
            stage_processing: DEFAULT_STAGE_PROCESSING,
            stage_reveal: DEFAULT_STAGE_REVEAL,
        }
    }
}

impl SequenceTiming {
    pub const fn immediate() -> Self {
        Self {
            lead_in: Duration::ZERO,
            stage_processing: Duration::ZERO,
            stage_reveal: Duration::ZERO,
        }
    }
}

/// What a failed backlog fetch turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailurePolicy {
    /// Indistinguishable from an empty backlog, apart from the recorded failure.
    #[default]
    FailOpen,
    /// Ends the run with [`Outcome::Unreachable`].
    ReportUnreachable,
}

impl std::str::FromStr for FetchFailurePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "empty" => Ok(Self::FailOpen),
            "report_unreachable" | "unreachable" => Ok(Self::ReportUnreachable),
            other => Err(format!("unknown fetch failure policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MachineContext {
    pub catalog: StageCatalog,
    pub timing: SequenceTiming,
    pub sanitizer: Sanitizer,
    pub fetch_failure_policy: FetchFailurePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    RevealStage(usize),
    CompleteStage(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { run_id: Uuid },
    BacklogFetched(Result<BacklogResponse, FailureReport>),
    TimerFired(Timer),
    Decide(Decision),
    ReconciliationSubmitted(Result<Vec<ReconciliationResult>, FailureReport>),
    ReconciledBacklogFetched(Result<Vec<Value>, FailureReport>),
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::BacklogFetched(_) => "backlog_fetched",
            Self::TimerFired(Timer::RevealStage(_)) => "reveal_stage",
            Self::TimerFired(Timer::CompleteStage(_)) => "complete_stage",
            Self::Decide(_) => "decide",
            Self::ReconciliationSubmitted(_) => "reconciliation_submitted",
            Self::ReconciledBacklogFetched(_) => "reconciled_backlog_fetched",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    FetchBacklog,
    Schedule { delay: Duration, timer: Timer },
    SubmitReconciliation,
    FetchReconciledBacklog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: RunState,
    pub effect: Option<Effect>,
}

impl Transition {
    fn settle(state: RunState) -> Self {
        Self {
            state,
            effect: None,
        }
    }

    fn then(state: RunState, effect: Effect) -> Self {
        Self {
            state,
            effect: Some(effect),
        }
    }
}

pub fn transition(
    state: &RunState,
    event: Event,
    context: &MachineContext,
) -> Result<Transition, OrchestratorError> {
    match (state.phase, event) {
        (Phase::Idle, Event::Start { run_id }) => Ok(begin_run(state, run_id, context)),
        (phase, Event::Start { .. }) => Err(OrchestratorError::InvalidTransition {
            operation: "start",
            phase,
        }),
        (Phase::AwaitingDecision, Event::Decide(decision)) => Ok(decide(state, decision)),
        (phase, Event::Decide(_)) => Err(OrchestratorError::InvalidTransition {
            operation: "decide",
            phase,
        }),
        (_, Event::Reset) => Ok(Transition::settle(reset(state, context))),
        (Phase::Fetching, Event::BacklogFetched(result)) => {
            Ok(backlog_fetched(state, result, context))
        }
        (Phase::Running, Event::TimerFired(Timer::RevealStage(order))) => {
            reveal_stage(state, order, context)
        }
        (Phase::Running, Event::TimerFired(Timer::CompleteStage(order))) => {
            complete_stage(state, order, context)
        }
        (Phase::Reconciling, Event::ReconciliationSubmitted(result))
            if !state.reconciliation_submitted =>
        {
            Ok(reconciliation_submitted(state, result))
        }
        (Phase::Reconciling, Event::ReconciledBacklogFetched(result))
            if state.reconciliation_submitted =>
        {
            Ok(reconciled_backlog_fetched(state, result, context))
        }
        (_, event) => Err(OrchestratorError::StaleEvent {
            event: event.name(),
        }),
    }
}

fn begin_run(state: &RunState, run_id: Uuid, context: &MachineContext) -> Transition {
    let mut next = RunState::idle(&context.catalog);
    next.success_count = state.success_count;
    next.failure_count = state.failure_count;
    next.run_id = Some(run_id);
    next.phase = Phase::Fetching;
    Transition::then(next, Effect::FetchBacklog)
}

fn backlog_fetched(
    state: &RunState,
    result: Result<BacklogResponse, FailureReport>,
    context: &MachineContext,
) -> Transition {
    let mut next = state.clone();

    let response = match result {
        Ok(response) => response,
        Err(failure) => {
            // Counts carried over from an earlier run do not describe this one.
            next.success_count = 0;
            next.failure_count = 0;
            next.failures.push(failure);
            next.phase = Phase::Terminal;
            match context.fetch_failure_policy {
                FetchFailurePolicy::FailOpen => {
                    next.empty_backlog = true;
                    next.outcome = Some(Outcome::NoIssues);
                }
                FetchFailurePolicy::ReportUnreachable => {
                    next.outcome = Some(Outcome::Unreachable);
                }
            }
            return Transition::settle(next);
        }
    };

    next.success_count = parse_count(&response.success_count);
    next.failure_count = parse_count(&response.failure_count);
    next.backlog = sanitize_records(response.failed_records, &context.sanitizer);

    if next.backlog.is_empty() {
        next.empty_backlog = true;
        next.phase = Phase::Terminal;
        next.outcome = Some(Outcome::NoIssues);
        return Transition::settle(next);
    }

    next.phase = Phase::Running;
    Transition::then(
        next,
        Effect::Schedule {
            delay: context.timing.lead_in,
            timer: Timer::RevealStage(0),
        },
    )
}

fn reveal_stage(
    state: &RunState,
    order: usize,
    context: &MachineContext,
) -> Result<Transition, OrchestratorError> {
    let stale = OrchestratorError::StaleEvent {
        event: "reveal_stage",
    };
    let next_hidden = state
        .stages
        .iter()
        .position(|slot| slot.status == StageStatus::HIDDEN);
    if state.active_stage.is_some() || next_hidden != Some(order) {
        return Err(stale);
    }

    let mut next = state.clone();
    next.stages[order].status = StageStatus::LOADING;
    next.active_stage = Some(order);
    Ok(Transition::then(
        next,
        Effect::Schedule {
            delay: context.timing.stage_processing,
            timer: Timer::CompleteStage(order),
        },
    ))
}

fn complete_stage(
    state: &RunState,
    order: usize,
    context: &MachineContext,
) -> Result<Transition, OrchestratorError> {
    let Some(descriptor) = context.catalog.get(order) else {
        return Err(OrchestratorError::StaleEvent {
            event: "complete_stage",
        });
    };
    if state.active_stage != Some(order) {
        return Err(OrchestratorError::StaleEvent {
            event: "complete_stage",
        });
    }

    let mut next = state.clone();
    let slot = &mut next.stages[order];
    slot.status = StageStatus::DONE;
    slot.output = Some(descriptor.static_result.clone());
    next.active_stage = None;

    if context.catalog.is_last(order) {
        next.phase = Phase::AwaitingDecision;
        return Ok(Transition::settle(next));
    }

    Ok(Transition::then(
        next,
        Effect::Schedule {
            delay: context.timing.stage_reveal,
            timer: Timer::RevealStage(order + 1),
        },
    ))
}

fn decide(state: &RunState, decision: Decision) -> Transition {
    let mut next = state.clone();
    match decision {
        Decision::Decline => {
            next.phase = Phase::Terminal;
            next.outcome = Some(Outcome::Declined);
            Transition::settle(next)
        }
        Decision::Reprocess => {
            next.phase = Phase::Reconciling;
            Transition::then(next, Effect::SubmitReconciliation)
        }
    }
}

fn reconciliation_submitted(
    state: &RunState,
    result: Result<Vec<ReconciliationResult>, FailureReport>,
) -> Transition {
    let mut next = state.clone();
    next.reconciliation_submitted = true;
    match result {
        Ok(results) => next.reconciliation = results,
        Err(failure) => next.failures.push(failure),
    }
    // The follow-up fetch is issued even when the update failed.
    Transition::then(next, Effect::FetchReconciledBacklog)
}

fn reconciled_backlog_fetched(
    state: &RunState,
    result: Result<Vec<Value>, FailureReport>,
    context: &MachineContext,
) -> Transition {
    let mut next = state.clone();
    match result {
        // Nothing was reconciled, so whatever the backend returns is not the corrected backlog.
        Ok(_) if next.failure(FailureKind::UpdateFailure).is_some() => {}
        Ok(items) => {
            next.reconciled_backlog = sanitize_records(Value::Array(items), &context.sanitizer);
        }
        Err(failure) => next.failures.push(failure),
    }
    next.phase = Phase::Terminal;
    next.outcome = Some(Outcome::Reconciled);
    Transition::settle(next)
}

fn reset(state: &RunState, context: &MachineContext) -> RunState {
    let mut next = RunState::idle(&context.catalog);
    next.success_count = state.success_count;
    next.failure_count = state.failure_count;
    next
}

fn sanitize_records(raw: Value, sanitizer: &Sanitizer) -> Vec<Record> {
    let (items, _) = unwrap_record_list(sanitizer.sanitize(raw));
    records_from_values(items).0
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
