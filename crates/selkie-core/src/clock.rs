//! Time abstraction for the dispatch core
//!
//! TigerStyle: All time reads go through a provider trait.
//!
//! The dispatcher and mailbox stamp envelopes and measure wait times through
//! `TimeProvider` so that tests and simulation harnesses can inject a
//! deterministic clock. Production code uses `WallClock`.

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

/// Time provider abstraction
///
/// Code in the core that needs the current time or a sleep MUST use this
/// trait rather than reading the system clock directly.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current time in milliseconds since epoch
    fn now_ms(&self) -> u64;

    /// Sleep for the specified duration
    async fn sleep_ms(&self, ms: u64);

    /// Get monotonic timestamp (for measuring durations)
    fn monotonic_ms(&self) -> u64 {
        self.now_ms()
    }
}

/// Production time provider using the wall clock
#[derive(Debug, Clone, Default)]
pub struct WallClock;

impl WallClock {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_now_is_nonzero() {
        let clock = WallClock::new();
        assert!(clock.now_ms() > 0);
        assert!(clock.monotonic_ms() > 0);
    }

    #[tokio::test]
    async fn test_wall_clock_sleep_advances_time() {
        let clock = WallClock::new();
        let before = clock.now_ms();
        clock.sleep_ms(20).await;
        assert!(clock.now_ms() >= before + 10);
    }
}
