use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{Record, ReconciliationResult},
    error::{FailureKind, FailureReport},
};
use uuid::Uuid;

use crate::catalog::StageCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    Running,
    AwaitingDecision,
    Reconciling,
    Terminal,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Backlog was empty (or, when failing open, could not be fetched).
    NoIssues,
    /// Backlog fetch failed and the orchestrator reports it distinctly.
    Unreachable,
    Declined,
    Reconciled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Reprocess,
    Decline,
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reprocess" | "yes" | "y" => Ok(Self::Reprocess),
            "decline" | "no" | "n" => Ok(Self::Decline),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageStatus {
    pub visible: bool,
    pub loading: bool,
}

impl StageStatus {
    pub const HIDDEN: Self = Self {
        visible: false,
        loading: false,
    };
    pub const LOADING: Self = Self {
        visible: true,
        loading: true,
    };
    pub const DONE: Self = Self {
        visible: true,
        loading: false,
    };

    pub fn is_done(self) -> bool {
        self == Self::DONE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSlot {
    pub name: String,
    pub status: StageStatus,
    pub output: Option<Value>,
}

/// Everything a presenter needs to draw the conversation. Owned by the
/// orchestrator; presenters only ever see [`Snapshot`]s of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub run_id: Option<Uuid>,
    pub phase: Phase,
    pub outcome: Option<Outcome>,
    pub stages: Vec<StageSlot>,
    pub active_stage: Option<usize>,
    pub backlog: Vec<Record>,
    pub reconciled_backlog: Vec<Record>,
    pub reconciliation: Vec<ReconciliationResult>,
    pub reconciliation_submitted: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub empty_backlog: bool,
    pub failures: Vec<FailureReport>,
}

pub type Snapshot = Arc<RunState>;

impl RunState {
    pub fn idle(catalog: &StageCatalog) -> Self {
        Self {
            run_id: None,
            phase: Phase::Idle,
            outcome: None,
            stages: catalog
                .stages()
                .iter()
                .map(|stage| StageSlot {
                    name: stage.name.clone(),
                    status: StageStatus::HIDDEN,
                    output: None,
                })
                .collect(),
            active_stage: None,
            backlog: Vec::new(),
            reconciled_backlog: Vec::new(),
            reconciliation: Vec::new(),
            reconciliation_submitted: false,
            success_count: 0,
            failure_count: 0,
            empty_backlog: false,
            failures: Vec::new(),
        }
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.slot(stage).map(|slot| slot.status)
    }

    pub fn output(&self, stage: &str) -> Option<&Value> {
        self.slot(stage).and_then(|slot| slot.output.as_ref())
    }

    fn slot(&self, stage: &str) -> Option<&StageSlot> {
        self.stages.iter().find(|slot| slot.name == stage)
    }

    pub fn loading_stages(&self) -> impl Iterator<Item = &StageSlot> {
        self.stages.iter().filter(|slot| slot.status.loading)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    pub fn awaiting_decision(&self) -> bool {
        self.phase == Phase::AwaitingDecision
    }

    pub fn failure(&self, kind: FailureKind) -> Option<&FailureReport> {
        self.failures.iter().find(|failure| failure.kind == kind)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
