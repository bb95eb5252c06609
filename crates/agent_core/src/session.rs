use async_trait::async_trait;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::warn;

use crate::{
    error::OrchestratorError,
    orchestrator::Orchestrator,
    state::{Decision, RunState, Snapshot},
};

/// Something that draws run state and relays the user's branch choice.
#[async_trait]
pub trait Presenter: Send {
    async fn render(&mut self, snapshot: &RunState);
    async fn choose(&mut self, snapshot: &RunState) -> Decision;
}

/// Mounts `presenter` on `orchestrator`: starts a run, renders every snapshot,
/// asks for a decision once the stages finish, and returns the terminal state.
pub async fn run_session<P>(
    orchestrator: &Orchestrator,
    presenter: &mut P,
) -> Result<Snapshot, OrchestratorError>
where
    P: Presenter + ?Sized,
{
    let mut snapshots = orchestrator.subscribe();
    orchestrator.start()?;

    let mut decided = false;
    loop {
        let snapshot = match snapshots.recv().await {
            Ok(snapshot) => snapshot,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "presenter fell behind; resuming from latest snapshot");
                match drain_to_latest(&mut snapshots) {
                    Some(latest) => latest,
                    None => orchestrator.snapshot(),
                }
            }
            Err(RecvError::Closed) => return Err(OrchestratorError::ShutDown),
        };

        presenter.render(&snapshot).await;
        if snapshot.is_terminal() {
            return Ok(snapshot);
        }
        if snapshot.awaiting_decision() && !decided {
            let decision = presenter.choose(&snapshot).await;
            orchestrator.decide(decision)?;
            decided = true;
        }
    }
}

/// Empties the receiver and returns the newest snapshot it held, so nothing
/// older than what the presenter is about to draw can arrive afterwards.
fn drain_to_latest(snapshots: &mut broadcast::Receiver<Snapshot>) -> Option<Snapshot> {
    let mut latest = None;
    loop {
        match snapshots.try_recv() {
            Ok(snapshot) => latest = Some(snapshot),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return latest,
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
