//! Configuration for the engine.

use crate::error::EngineError;
use std::time::Duration;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Store configuration.
    pub core: jam_core::Config,
    /// Number of write intents that may wait in the serializer queue.
    pub queue_capacity: usize,
    /// Number of events buffered per subscriber before it lags.
    pub event_capacity: usize,
    /// Retry configuration for sync.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            core: jam_core::Config::default(),
            queue_capacity: 256,
            event_capacity: 1024,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the store configuration.
    pub fn with_core(mut self, core: jam_core::Config) -> Self {
        self.core = core;
        self
    }

    /// Sets the serializer queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the event buffer capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How [`SyncEngine::sync_with_retry`](crate::SyncEngine::sync_with_retry)
/// treats a failed run.
///
/// Only transport errors flagged retryable start another run; a store error
/// or a rejected response ends it at once. The pause between runs doubles
/// after every failure up to `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Runs allowed per call, the first one included.
    pub attempts: u32,
    /// Pause after the first failed run.
    pub backoff: Duration,
    /// Longest pause between runs.
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Allows up to `attempts` runs. Zero is treated as one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }

    /// A single run, no retries.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the pause after the first failure.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the longest pause.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Returns true if another run may follow `failures` failed runs, the
    /// last of which failed with `error`.
    pub fn allows(&self, error: &EngineError, failures: u32) -> bool {
        failures < self.attempts && error.is_retryable()
    }

    /// Returns the pause before the next run after `failures` failed runs.
    pub fn pause_after(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(31);
        self.backoff
            .saturating_mul(1_u32 << doublings)
            .min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jam_core::CoreError;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_queue_capacity(8)
            .with_event_capacity(0)
            .with_core(jam_core::Config::new().temporary_id_prefix("local-"))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.core.temporary_id_prefix, "local-");
        assert_eq!(config.retry.attempts, 1);
    }

    #[test]
    fn pause_doubles_up_to_cap() {
        let retry = RetryConfig::new(8)
            .with_backoff(Duration::from_millis(50))
            .with_max_backoff(Duration::from_millis(300));

        let pauses: Vec<_> = (1..=5).map(|n| retry.pause_after(n).as_millis()).collect();
        assert_eq!(pauses, vec![50, 100, 200, 300, 300]);
    }

    #[test]
    fn pause_saturates_on_long_outages() {
        let retry = RetryConfig::new(u32::MAX)
            .with_backoff(Duration::MAX)
            .with_max_backoff(Duration::from_secs(60));

        assert_eq!(retry.pause_after(u32::MAX), Duration::from_secs(60));
        assert_eq!(RetryConfig::no_retry().pause_after(0), Duration::from_millis(100));
    }

    #[test]
    fn only_retryable_transport_errors_are_retried() {
        let retry = RetryConfig::new(3);
        let offline = EngineError::transport_retryable("connection reset");

        assert!(retry.allows(&offline, 1));
        assert!(retry.allows(&offline, 2));
        assert!(!retry.allows(&offline, 3));
        assert!(!retry.allows(&EngineError::transport_fatal("bad results"), 1));
        assert!(!retry.allows(&EngineError::from(CoreError::malformed("x")), 1));
        assert!(!RetryConfig::no_retry().allows(&offline, 1));
    }
}
