//! Retry utilities: backoff builders for optimistic-concurrency retries.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::ConflictRetryConfig;

/// Backoff for conditional parent-document writes that lost a race.
///
/// Defaults (see [`ConflictRetryConfig`]):
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max attempts: 8
/// - Jitter enabled
pub fn conflict_backoff(config: &ConflictRetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_times)
        .with_jitter()
}
