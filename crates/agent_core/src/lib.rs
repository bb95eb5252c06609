//! Staged sequence orchestration for the IDOC support agent walkthrough.
//!
//! [`Orchestrator`] fetches the failed-record backlog from a [`DataSource`],
//! replays the [`StageCatalog`] with artificial pacing, then branches on the
//! user's [`Decision`] into reconciliation or a polite exit. Presenters consume
//! immutable [`Snapshot`]s and never touch the run state directly.

pub mod catalog;
pub mod data_source;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod scheduler;
pub mod session;
pub mod state;

pub use catalog::{StageCatalog, StageDefinition, StageDescriptor};
pub use data_source::{DataSource, Endpoints, HttpDataSource, MissingDataSource};
pub use error::{CatalogError, DataSourceError, OrchestratorError};
pub use machine::{FetchFailurePolicy, SequenceTiming};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use scheduler::{Scheduler, TokioScheduler};
pub use session::{run_session, Presenter};
pub use state::{Decision, Outcome, Phase, RunState, Snapshot, StageSlot, StageStatus};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
