//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinator and dispatch loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Deadline for one broadcast to reach quorum, in milliseconds
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,

    /// Correlators are issued from `[1, correlator-pool-size)`
    #[serde(default = "default_correlator_pool_size")]
    pub correlator_pool_size: u32,

    /// Buffer for externally submitted requests
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Buffer for follow-on and startup requests
    #[serde(default = "default_internal_channel_buffer")]
    pub internal_channel_buffer: usize,

    /// Period of the maintenance timer tick
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,

    /// How long the loop waits for one startup hook to finish a phase
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Number of event trace entries retained
    #[serde(default = "default_trace_depth")]
    pub trace_depth: usize,
}

fn default_event_timeout_ms() -> u64 {
    debug!("default_event_timeout_ms: called");
    600_000
}

fn default_correlator_pool_size() -> u32 {
    debug!("default_correlator_pool_size: called");
    32_000
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1024
}

fn default_internal_channel_buffer() -> usize {
    debug!("default_internal_channel_buffer: called");
    1024
}

fn default_timer_interval_ms() -> u64 {
    debug!("default_timer_interval_ms: called");
    1000
}

fn default_startup_timeout_ms() -> u64 {
    debug!("default_startup_timeout_ms: called");
    10_000
}

fn default_trace_depth() -> usize {
    debug!("default_trace_depth: called");
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            event_timeout_ms: default_event_timeout_ms(),
            correlator_pool_size: default_correlator_pool_size(),
            channel_buffer: default_channel_buffer(),
            internal_channel_buffer: default_internal_channel_buffer(),
            timer_interval_ms: default_timer_interval_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            trace_depth: default_trace_depth(),
        }
    }
}

impl CoordinatorConfig {
    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn timer_interval(&self) -> Duration {
        // interval() panics on zero
        Duration::from_millis(self.timer_interval_ms.max(1))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Builder used by tests and the simulator
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.event_timeout(), Duration::from_secs(600));
        assert_eq!(config.correlator_pool_size, 32_000);
        assert_eq!(config.channel_buffer, 1024);
        assert_eq!(config.trace_depth, 256);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("event-timeout-ms: 250\n").unwrap();
        assert_eq!(config.event_timeout(), Duration::from_millis(250));
        assert_eq!(config.startup_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timer_interval_clamped() {
        let config = CoordinatorConfig {
            timer_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.timer_interval(), Duration::from_millis(1));
    }
}
