//! Coordinator timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest sweep interval the coordinator accepts.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Timing knobs for liveness and queue expiry.
///
/// Timeouts are advisory: nothing interrupts an in-flight operation. A
/// caller that crosses a threshold is removed on the next sweep, so the
/// worst-case eviction delay is `timeout + sweep_interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingConfig {
    /// A caller whose last heartbeat (or join) is older than this is
    /// evicted, whether queued or paired.
    pub heartbeat_timeout: Duration,

    /// A caller queued for longer than this is evicted even if it keeps
    /// heartbeating. Must be strictly larger than `heartbeat_timeout`.
    pub queue_timeout: Duration,

    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            queue_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl PairingConfig {
    /// Largest value accepted for any of the three durations (one year).
    pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Fixes out-of-range values so the config is safe to run with.
    ///
    /// Called by [`spawn_coordinator`](crate::spawn_coordinator) and
    /// [`PairingState::new`](crate::PairingState::new). Rules:
    /// - every duration is capped at [`MAX_DURATION`](Self::MAX_DURATION).
    /// - `sweep_interval` is raised to at least 100 ms.
    /// - `queue_timeout` not above `heartbeat_timeout` is raised to
    ///   `heartbeat_timeout + sweep_interval`.
    pub fn validated(mut self) -> Self {
        for (name, value) in [
            ("heartbeat_timeout", &mut self.heartbeat_timeout),
            ("queue_timeout", &mut self.queue_timeout),
            ("sweep_interval", &mut self.sweep_interval),
        ] {
            if *value > Self::MAX_DURATION {
                tracing::warn!(
                    field = name,
                    max_secs = Self::MAX_DURATION.as_secs(),
                    "duration above maximum, capping"
                );
                *value = Self::MAX_DURATION;
            }
        }
        if self.sweep_interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(
                sweep_interval_ms = self.sweep_interval.as_millis() as u64,
                min_ms = MIN_SWEEP_INTERVAL.as_millis() as u64,
                "sweep_interval below minimum, clamping"
            );
            self.sweep_interval = MIN_SWEEP_INTERVAL;
        }
        if self.queue_timeout <= self.heartbeat_timeout {
            let raised = self.heartbeat_timeout.saturating_add(self.sweep_interval);
            tracing::warn!(
                queue_timeout_ms = self.queue_timeout.as_millis() as u64,
                heartbeat_timeout_ms =
                    self.heartbeat_timeout.as_millis() as u64,
                raised_ms = raised.as_millis() as u64,
                "queue_timeout must exceed heartbeat_timeout, raising"
            );
            self.queue_timeout = raised;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_operator_defaults() {
        let config = PairingConfig::default();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(15));
        assert_eq!(config.queue_timeout, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_validated_keeps_sane_config() {
        let config = PairingConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_validated_clamps_zero_sweep_interval() {
        let config = PairingConfig {
            sweep_interval: Duration::ZERO,
            ..PairingConfig::default()
        }
        .validated();
        assert_eq!(config.sweep_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_validated_raises_queue_timeout_not_above_heartbeat() {
        let config = PairingConfig {
            heartbeat_timeout: Duration::from_secs(30),
            queue_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
        .validated();
        assert_eq!(config.queue_timeout, Duration::from_secs(35));
    }

    #[test]
    fn test_validated_caps_huge_durations_without_overflow() {
        let config = PairingConfig {
            heartbeat_timeout: Duration::MAX,
            queue_timeout: Duration::MAX,
            sweep_interval: Duration::MAX,
        }
        .validated();
        assert_eq!(config.heartbeat_timeout, PairingConfig::MAX_DURATION);
        assert_eq!(config.sweep_interval, PairingConfig::MAX_DURATION);
        assert!(config.queue_timeout > config.heartbeat_timeout);
    }

    #[test]
    fn test_config_serde_roundtrip_keeps_durations() {
        let config = PairingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PairingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
