//! Throttling wait used between batches

use async_trait::async_trait;
use std::time::Duration;

/// Suspends the run for the configured pause
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Wall-clock pause backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
