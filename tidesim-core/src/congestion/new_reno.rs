//! Classic AIMD congestion control with fast recovery.

use super::{
    AckSample, CongestionAlgorithm, CongestionControl, CongestionState, LossKind,
    halved_threshold,
};
use crate::config::TransportConfig;
use crate::time::SimTime;

/// NewReno-style controller.
///
/// Slow start adds every acknowledged byte to the window until the window
/// reaches `ssthresh`, after which congestion avoidance adds roughly one
/// segment per round trip (`mss² / cwnd` per acknowledgment).
#[derive(Debug, Clone)]
pub struct NewReno {
    mss: u64,
    cwnd: u64,
    ssthresh: u64,
    state: CongestionState,
}

impl NewReno {
    /// Creates a controller with the configured initial window and threshold.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            mss: u64::from(config.mss),
            cwnd: config.initial_cwnd(),
            ssthresh: config.initial_ssthresh,
            state: CongestionState::SlowStart,
        }
    }
}

impl CongestionControl for NewReno {
    fn algorithm(&self) -> CongestionAlgorithm {
        CongestionAlgorithm::NewReno
    }

    fn on_ack(&mut self, sample: &AckSample) {
        if sample.app_limited || sample.bytes_acked == 0 {
            return;
        }

        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += sample.bytes_acked;
                if self.cwnd >= self.ssthresh {
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
            CongestionState::CongestionAvoidance => {
                self.cwnd += (self.mss * self.mss / self.cwnd).max(1);
            }
            // Window is frozen until the recovery point is acknowledged
            CongestionState::Recovery => {}
        }
    }

    fn on_loss(&mut self, kind: LossKind, now: SimTime) {
        let before = self.cwnd;
        self.ssthresh = halved_threshold(self.cwnd, self.mss);
        self.cwnd = self.ssthresh.min(before);
        self.state = match kind {
            LossKind::Timeout => CongestionState::CongestionAvoidance,
            LossKind::DuplicateAcks => CongestionState::Recovery,
        };
        tracing::debug!(
            ?kind,
            %now,
            cwnd_before = before,
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            "NewReno window reduced"
        );
    }

    fn on_recovery_exit(&mut self, _now: SimTime) {
        if self.state == CongestionState::Recovery {
            self.state = CongestionState::CongestionAvoidance;
        }
    }

    fn cwnd(&self) -> u64 {
        self.cwnd
    }

    fn ssthresh(&self) -> u64 {
        self.ssthresh
    }

    fn state(&self) -> CongestionState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(bytes_acked: u64) -> AckSample {
        AckSample {
            bytes_acked,
            now: SimTime::ZERO,
            smoothed_rtt: None,
            app_limited: false,
        }
    }

    #[test]
    fn test_slow_start_adds_acked_bytes() {
        let mut reno = NewReno::new(&TransportConfig::default());
        reno.on_ack(&ack(1024));
        assert_eq!(reno.cwnd(), 1448 + 1024);
        assert_eq!(reno.state(), CongestionState::SlowStart);
    }

    #[test]
    fn test_switches_to_avoidance_at_threshold() {
        let config = TransportConfig {
            initial_ssthresh: 4 * 1448,
            ..Default::default()
        };
        let mut reno = NewReno::new(&config);
        for _ in 0..3 {
            reno.on_ack(&ack(1448));
        }
        assert_eq!(reno.cwnd(), 4 * 1448);
        assert_eq!(reno.state(), CongestionState::CongestionAvoidance);

        // One segment per window's worth of acknowledgments
        reno.on_ack(&ack(1448));
        assert_eq!(reno.cwnd(), 4 * 1448 + 1448 / 4);
    }

    #[test]
    fn test_app_limited_ack_does_not_grow() {
        let mut reno = NewReno::new(&TransportConfig::default());
        reno.on_ack(&AckSample {
            app_limited: true,
            ..ack(1448)
        });
        assert_eq!(reno.cwnd(), 1448);
    }

    #[test]
    fn test_duplicate_ack_loss_enters_recovery() {
        let mut reno = NewReno::new(&TransportConfig::default());
        for _ in 0..9 {
            reno.on_ack(&ack(1448));
        }
        let before = reno.cwnd();

        reno.on_loss(LossKind::DuplicateAcks, SimTime::from_secs(1));
        assert_eq!(reno.ssthresh(), before / 2);
        assert_eq!(reno.cwnd(), before / 2);
        assert_eq!(reno.state(), CongestionState::Recovery);

        // Frozen during recovery
        reno.on_ack(&ack(1448));
        assert_eq!(reno.cwnd(), before / 2);

        reno.on_recovery_exit(SimTime::from_secs(2));
        assert_eq!(reno.state(), CongestionState::CongestionAvoidance);
    }

    #[test]
    fn test_loss_never_raises_small_window() {
        let mut reno = NewReno::new(&TransportConfig::default());
        reno.on_loss(LossKind::Timeout, SimTime::ZERO);

        assert_eq!(reno.ssthresh(), 2 * 1448);
        assert_eq!(reno.cwnd(), 1448);
        assert_eq!(reno.state(), CongestionState::CongestionAvoidance);
    }
}
