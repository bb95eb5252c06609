use std::time::Duration;

use async_trait::async_trait;

/// Source of the artificial pauses between stages. Swapped out in tests to
/// observe or skip the waits.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Waits on the tokio timer, so a paused test runtime advances it virtually.
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
