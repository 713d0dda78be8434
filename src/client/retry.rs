//! # Reconnect Backoff
//!
//! Exponential delays between automatic reconnect attempts: `base`, then
//! doubling per attempt, capped at `max`. No jitter, so reconnect timing is
//! reproducible under paused tokio time.

use crate::shared::AppConfig;
use std::time::Duration;

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.reconnect_base, config.reconnect_max)
    }

    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
