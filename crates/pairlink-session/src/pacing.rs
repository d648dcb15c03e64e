//! Inter-send pacing for bulk dispatch.

use std::time::Duration;

use async_trait::async_trait;
use pairlink_core::PacingWindow;
use rand::Rng;

/// Pause between consecutive sends.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait before the next send.
    async fn pause(&self);
}

/// Sleeps for a duration drawn uniformly from a window.
#[derive(Debug, Clone, Copy)]
pub struct RandomPacer {
    window: PacingWindow,
}

impl RandomPacer {
    /// Create a pacer over `window`.
    #[must_use]
    pub const fn new(window: PacingWindow) -> Self {
        Self { window }
    }

    /// Draw the next delay.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_delay(&self) -> Duration {
        let min = self.window.min.as_millis() as u64;
        let max = self.window.max.as_millis() as u64;
        if min >= max {
            return self.window.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for RandomPacer {
    fn default() -> Self {
        Self::new(PacingWindow::default())
    }
}

#[async_trait]
impl Pacer for RandomPacer {
    async fn pause(&self) {
        let delay = self.next_delay();
        tracing::trace!(delay_ms = delay.as_millis(), "pacing");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
