//! Congestion control strategies.
//!
//! Every endpoint owns one controller, chosen at construction time through
//! [`CongestionAlgorithm`]. Controllers are pure state machines: they see
//! acknowledgments and loss events with simulated timestamps and never
//! consult wall-clock time or randomness.

mod cubic;
mod new_reno;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use cubic::{CUBIC_BETA, CUBIC_C, Cubic};
pub use new_reno::NewReno;

use crate::config::TransportConfig;
use crate::time::SimTime;

/// Phase of the congestion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    Recovery,
}

impl fmt::Display for CongestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionState::SlowStart => write!(f, "slow-start"),
            CongestionState::CongestionAvoidance => write!(f, "congestion-avoidance"),
            CongestionState::Recovery => write!(f, "recovery"),
        }
    }
}

/// How a loss was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Retransmission timer expired
    Timeout,
    /// Duplicate acknowledgment threshold reached
    DuplicateAcks,
}

/// Acknowledgment observed by the sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckSample {
    /// Bytes newly acknowledged by this ACK
    pub bytes_acked: u64,
    /// Arrival time of the ACK
    pub now: SimTime,
    /// Current smoothed round-trip time, if measured
    pub smoothed_rtt: Option<Duration>,
    /// Sender had spare window before this ACK, so growth is not earned
    pub app_limited: bool,
}

/// Window management strategy.
pub trait CongestionControl: fmt::Debug {
    /// Returns which algorithm this controller implements.
    fn algorithm(&self) -> CongestionAlgorithm;

    /// Reacts to newly acknowledged data outside of recovery.
    fn on_ack(&mut self, sample: &AckSample);

    /// Reacts to a detected loss. Called once per loss event.
    fn on_loss(&mut self, kind: LossKind, now: SimTime);

    /// Leaves fast recovery after a full acknowledgment.
    fn on_recovery_exit(&mut self, now: SimTime);

    /// Current congestion window in bytes. Never below one segment.
    fn cwnd(&self) -> u64;

    /// Current slow-start threshold in bytes.
    fn ssthresh(&self) -> u64;

    /// Current phase.
    fn state(&self) -> CongestionState;
}

/// Congestion control variant selected per endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CongestionAlgorithm {
    /// Additive increase, multiplicative decrease with fast recovery
    #[default]
    NewReno,
    /// Cubic window growth in time since the last loss
    Cubic,
}

impl CongestionAlgorithm {
    /// Constructs a fresh controller for this algorithm.
    pub fn build(self, config: &TransportConfig) -> Box<dyn CongestionControl> {
        match self {
            CongestionAlgorithm::NewReno => Box::new(NewReno::new(config)),
            CongestionAlgorithm::Cubic => Box::new(Cubic::new(config)),
        }
    }
}

impl fmt::Display for CongestionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionAlgorithm::NewReno => write!(f, "new-reno"),
            CongestionAlgorithm::Cubic => write!(f, "cubic"),
        }
    }
}

impl FromStr for CongestionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "new-reno" | "newreno" | "reno" => Ok(CongestionAlgorithm::NewReno),
            "cubic" => Ok(CongestionAlgorithm::Cubic),
            _ => Err(format!("Unknown congestion algorithm: {s}")),
        }
    }
}

/// Loss response shared by the AIMD variant: half the window, floored at two segments.
pub(crate) fn halved_threshold(cwnd: u64, mss: u64) -> u64 {
    (cwnd / 2).max(2 * mss)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("NewReno".parse(), Ok(CongestionAlgorithm::NewReno));
        assert_eq!("new_reno".parse(), Ok(CongestionAlgorithm::NewReno));
        assert_eq!("cubic".parse(), Ok(CongestionAlgorithm::Cubic));
        assert!("bbr".parse::<CongestionAlgorithm>().is_err());
        assert_eq!(CongestionAlgorithm::Cubic.to_string(), "cubic");
    }

    #[test]
    fn test_build_selects_variant() {
        let config = TransportConfig::default();
        for algorithm in [CongestionAlgorithm::NewReno, CongestionAlgorithm::Cubic] {
            let controller = algorithm.build(&config);
            assert_eq!(controller.algorithm(), algorithm);
            assert_eq!(controller.cwnd(), config.initial_cwnd());
            assert_eq!(controller.state(), CongestionState::SlowStart);
        }
    }
}
