//! Centralized configuration for Tidesim.
//!
//! All tunable protocol, link and simulation parameters are defined here to
//! avoid hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::TidesimError;
use crate::time::SimTime;

/// Central configuration for all Tidesim components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct TidesimConfig {
    pub transport: TransportConfig,
    pub link: LinkConfig,
    pub simulation: SimulationConfig,
}

/// Transport endpoint and congestion control parameters.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum segment payload in bytes
    pub mss: u32,
    /// Initial congestion window in segments
    pub initial_cwnd_segments: u32,
    /// Initial slow-start threshold in bytes
    pub initial_ssthresh: u64,
    /// Send buffer size reported to applications as available space
    pub send_buffer_capacity: u64,
    /// Receive window advertised to the peer
    pub receive_window: u64,
    /// Retransmission timeout before the first RTT sample
    pub initial_rto: Duration,
    /// Lower bound for the retransmission timeout
    pub min_rto: Duration,
    /// Upper bound for the retransmission timeout, including backoff
    pub max_rto: Duration,
    /// Timer granularity used in the RTO formula
    pub clock_granularity: Duration,
    /// Consecutive timeouts tolerated before the connection fails
    pub max_retransmissions: u32,
    /// Duplicate acknowledgments that trigger fast retransmit
    pub dup_ack_threshold: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mss: 1448,
            initial_cwnd_segments: 1,
            initial_ssthresh: 65_535,
            send_buffer_capacity: 131_072, // 128 KiB
            receive_window: 131_072,       // 128 KiB
            initial_rto: Duration::from_secs(1),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            clock_granularity: Duration::from_millis(1),
            max_retransmissions: 6,
            dup_ack_threshold: 3,
        }
    }
}

impl TransportConfig {
    /// Initial congestion window in bytes.
    pub fn initial_cwnd(&self) -> u64 {
        u64::from(self.initial_cwnd_segments) * u64::from(self.mss)
    }

    /// Checks parameter consistency.
    ///
    /// # Errors
    ///
    /// - `TidesimError::Configuration` - If a parameter is zero or RTO bounds are inverted
    pub fn validate(&self) -> Result<(), TidesimError> {
        let fail = |reason: &str| {
            Err(TidesimError::Configuration {
                reason: reason.to_string(),
            })
        };

        if self.mss == 0 {
            return fail("mss must be greater than zero");
        }
        if self.initial_cwnd_segments == 0 {
            return fail("initial congestion window must be at least one segment");
        }
        if self.min_rto > self.max_rto {
            return fail("min_rto must not exceed max_rto");
        }
        if self.min_rto.is_zero() {
            return fail("min_rto must be greater than zero");
        }
        if self.dup_ack_threshold == 0 {
            return fail("dup_ack_threshold must be greater than zero");
        }
        if self.max_retransmissions == 0 {
            return fail("max_retransmissions must be greater than zero");
        }
        Ok(())
    }
}

/// Point-to-point link parameters shared by all links.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Per-packet header overhead added to the payload on the wire
    pub header_bytes: u32,
    /// Drop-tail queue capacity per direction in packets
    pub queue_capacity: usize,
    /// Probability of dropping a data packet (0.0 to 1.0)
    pub random_loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            header_bytes: 40,
            queue_capacity: 100,
            random_loss_rate: 0.0,
        }
    }
}

/// Scheduler and run-level configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Seed for every random decision in the run
    pub seed: u64,
    /// Time after which the scheduler stops executing events
    pub stop_time: Option<SimTime>,
    /// Maximum number of live events before the run aborts
    pub max_pending_events: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stop_time: None,
            max_pending_events: 1_000_000,
        }
    }
}

impl TidesimConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            simulation: SimulationConfig {
                seed: 42, // Fixed seed for reproducible tests
                stop_time: Some(SimTime::from_secs(60)),
                max_pending_events: 100_000,
            },
            ..Default::default()
        }
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(mss) = env_parse::<u32>("TIDESIM_MSS") {
            config.transport.mss = mss;
        }

        if let Some(min_rto_ms) = env_parse::<u64>("TIDESIM_MIN_RTO_MS") {
            config.transport.min_rto = Duration::from_millis(min_rto_ms);
        }

        if let Some(capacity) = env_parse::<usize>("TIDESIM_QUEUE_CAPACITY") {
            config.link.queue_capacity = capacity;
        }

        if let Some(seed) = env_parse::<u64>("TIDESIM_SEED") {
            config.simulation.seed = seed;
        }

        if let Some(secs) = env_parse::<f64>("TIDESIM_STOP_TIME_SECS") {
            config.simulation.stop_time = SimTime::try_from_secs_f64(secs);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transport_config_is_valid() {
        assert!(TransportConfig::default().validate().is_ok());
        assert_eq!(TransportConfig::default().initial_cwnd(), 1448);
    }

    #[test]
    fn test_invalid_transport_config_rejected() {
        let zero_mss = TransportConfig {
            mss: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_mss.validate(),
            Err(TidesimError::Configuration { .. })
        ));

        let inverted = TransportConfig {
            min_rto: Duration::from_secs(5),
            max_rto: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_deterministic_testing_has_stop_time() {
        let config = TidesimConfig::deterministic_testing();
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.simulation.stop_time, Some(SimTime::from_secs(60)));
    }
}
