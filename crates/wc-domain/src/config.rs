//! Tuning configuration per WC-SPEC §6, with environment-variable loading in
//! the style this codebase uses throughout (`from_env()` plus a hardcoded
//! `Default`), rather than a config-file crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dead-letter representation choice (WC-SPEC §9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterPolicy {
    /// Row stays in its table with `status = DeadLettered`.
    MarkTerminal,
    /// Row moves to a dedicated dead-letter table.
    MoveTable,
}

/// Which `WorkCoordinatorStrategy` variant a service runs (WC-SPEC §4.3).
/// Not mixed within a single scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    Immediate,
    Scoped,
    Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub partition_count: u32,
    pub max_partitions_per_instance: u32,
    pub lease_seconds: i64,
    pub stale_threshold_seconds: i64,
    pub max_claim_batch: u32,
    pub flush_interval_ms: u64,
    pub flush_batch_threshold: usize,
    pub max_stream_parallelism: usize,
    pub max_retries: u32,
    pub event_suffix: String,
    pub dead_letter_policy: DeadLetterPolicy,
    pub dedup_window_days: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            partition_count: 10_000,
            max_partitions_per_instance: 100,
            lease_seconds: 300,
            stale_threshold_seconds: 600,
            max_claim_batch: 100,
            flush_interval_ms: 100,
            flush_batch_threshold: 256,
            max_stream_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_retries: 8,
            event_suffix: "Event".to_string(),
            dead_letter_policy: DeadLetterPolicy::MarkTerminal,
            dedup_window_days: 7,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            partition_count: env_parsed("WC_PARTITION_COUNT", default.partition_count),
            max_partitions_per_instance: env_parsed(
                "WC_MAX_PARTITIONS_PER_INSTANCE",
                default.max_partitions_per_instance,
            ),
            lease_seconds: env_parsed("WC_LEASE_SECONDS", default.lease_seconds),
            stale_threshold_seconds: env_parsed(
                "WC_STALE_THRESHOLD_SECONDS",
                default.stale_threshold_seconds,
            ),
            max_claim_batch: env_parsed("WC_MAX_CLAIM_BATCH", default.max_claim_batch),
            flush_interval_ms: env_parsed("WC_FLUSH_INTERVAL_MS", default.flush_interval_ms),
            flush_batch_threshold: env_parsed(
                "WC_FLUSH_BATCH_THRESHOLD",
                default.flush_batch_threshold,
            ),
            max_stream_parallelism: env_parsed(
                "WC_MAX_STREAM_PARALLELISM",
                default.max_stream_parallelism,
            ),
            max_retries: env_parsed("WC_MAX_RETRIES", default.max_retries),
            event_suffix: std::env::var("WC_EVENT_SUFFIX").unwrap_or(default.event_suffix),
            dead_letter_policy: match std::env::var("WC_DEAD_LETTER_POLICY").as_deref() {
                Ok("MOVE_TABLE") => DeadLetterPolicy::MoveTable,
                Ok("MARK_TERMINAL") => DeadLetterPolicy::MarkTerminal,
                _ => default.dead_letter_policy,
            },
            dedup_window_days: env_parsed("WC_DEDUP_WINDOW_DAYS", default.dedup_window_days),
        }
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_seconds.max(0) as u64)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Coordinator-level argument validation (WC-SPEC §4.2): the
    /// WorkCoordinator's only added behavior over the raw Store contract.
    pub fn validate(&self) -> Result<(), String> {
        if self.partition_count == 0 {
            return Err("partition_count must be > 0".to_string());
        }
        if self.lease_seconds <= 0 {
            return Err("lease_seconds must be > 0".to_string());
        }
        if self.max_partitions_per_instance < 1 {
            return Err("max_partitions_per_instance must be >= 1".to_string());
        }
        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Exponential backoff schedule for outbox/inbox retries, per WC-SPEC §6:
/// `exponential(baseMs=500, factor=2, jitter=20%)`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    pub base_ms: u64,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base_ms: 500,
            factor: 2.0,
            jitter: 0.20,
        }
    }
}

impl BackoffSchedule {
    /// Delay before retry number `retry_count` (1-based), before jitter.
    /// `jitter_unit` is a caller-supplied value in `[-1.0, 1.0]` so the
    /// function stays pure and testable; callers source it from an RNG.
    pub fn delay_for(&self, retry_count: u32, jitter_unit: f64) -> Duration {
        let exponent = retry_count.saturating_sub(1) as i32;
        let base = self.base_ms as f64 * self.factor.powi(exponent);
        let jitter_unit = jitter_unit.clamp(-1.0, 1.0);
        let jittered = base * (1.0 + jitter_unit * self.jitter);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.partition_count, 10_000);
        assert_eq!(config.max_partitions_per_instance, 100);
        assert_eq!(config.lease_seconds, 300);
        assert_eq!(config.stale_threshold_seconds, 600);
        assert_eq!(config.max_claim_batch, 100);
        assert_eq!(config.flush_interval_ms, 100);
        assert_eq!(config.flush_batch_threshold, 256);
        assert_eq!(config.max_retries, 8);
        assert_eq!(config.event_suffix, "Event");
        assert_eq!(config.dead_letter_policy, DeadLetterPolicy::MarkTerminal);
    }

    #[test]
    fn validate_rejects_zero_partition_count() {
        let mut config = CoordinatorConfig::default();
        config.partition_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_lease() {
        let mut config = CoordinatorConfig::default();
        config.lease_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_grows_exponentially_without_jitter() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_for(1, 0.0), Duration::from_millis(500));
        assert_eq!(schedule.delay_for(2, 0.0), Duration::from_millis(1_000));
        assert_eq!(schedule.delay_for(3, 0.0), Duration::from_millis(2_000));
    }

    #[test]
    fn backoff_jitter_stays_within_twenty_percent() {
        let schedule = BackoffSchedule::default();
        let base = schedule.delay_for(1, 0.0).as_millis() as f64;
        let high = schedule.delay_for(1, 1.0).as_millis() as f64;
        let low = schedule.delay_for(1, -1.0).as_millis() as f64;
        assert!((high - base) <= base * 0.20 + 1.0);
        assert!((base - low) <= base * 0.20 + 1.0);
    }
}
