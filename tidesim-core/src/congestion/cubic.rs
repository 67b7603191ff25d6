//! Cubic congestion control.
//!
//! After a congestion event the window follows
//! `W(t) = C * (t - K)^3 + W_max` (in segments), where `t` is the time since
//! the event and `K` is the time at which the curve returns to `W_max`.
//! Growth is concave while approaching `W_max` and convex beyond it, and
//! depends only on elapsed simulated time, not on how many ACKs arrived.

use std::time::Duration;

use super::{AckSample, CongestionAlgorithm, CongestionControl, CongestionState, LossKind};
use crate::config::TransportConfig;
use crate::time::SimTime;

/// Scaling constant of the cubic curve.
pub const CUBIC_C: f64 = 0.4;

/// Multiplicative decrease factor applied on loss.
pub const CUBIC_BETA: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
struct Epoch {
    start: SimTime,
    /// Window at the last reduction point, in segments
    w_max: f64,
    /// Seconds until the curve returns to `w_max`
    k: f64,
}

/// Cubic controller.
#[derive(Debug, Clone)]
pub struct Cubic {
    mss: u64,
    cwnd: u64,
    ssthresh: u64,
    state: CongestionState,
    epoch: Option<Epoch>,
}

impl Cubic {
    /// Creates a controller with the configured initial window and threshold.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            mss: u64::from(config.mss),
            cwnd: config.initial_cwnd(),
            ssthresh: config.initial_ssthresh,
            state: CongestionState::SlowStart,
            epoch: None,
        }
    }

    /// Window the cubic curve prescribes `elapsed` after the current epoch started.
    ///
    /// Returns `None` before the first epoch, while the controller is still in
    /// its initial slow start.
    pub fn window_at(&self, elapsed: Duration) -> Option<u64> {
        self.epoch.map(|epoch| self.curve(epoch, elapsed))
    }

    /// Time until the curve returns to the last reduction point.
    pub fn k(&self) -> Option<Duration> {
        self.epoch.map(|epoch| Duration::from_secs_f64(epoch.k))
    }

    fn curve(&self, epoch: Epoch, elapsed: Duration) -> u64 {
        let offset = elapsed.as_secs_f64() - epoch.k;
        let segments = CUBIC_C * offset.powi(3) + epoch.w_max;
        let bytes = (segments * self.mss as f64).round();
        if bytes.is_finite() && bytes > self.mss as f64 {
            bytes as u64
        } else {
            self.mss
        }
    }

    fn start_epoch(&mut self, now: SimTime, w_max_bytes: u64, k: f64) {
        self.epoch = Some(Epoch {
            start: now,
            w_max: w_max_bytes as f64 / self.mss as f64,
            k,
        });
    }
}

impl CongestionControl for Cubic {
    fn algorithm(&self) -> CongestionAlgorithm {
        CongestionAlgorithm::Cubic
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
                    self.start_epoch(sample.now, self.cwnd, 0.0);
                }
            }
            CongestionState::CongestionAvoidance => {
                let epoch = match self.epoch {
                    Some(epoch) => epoch,
                    None => {
                        self.start_epoch(sample.now, self.cwnd, 0.0);
                        return;
                    }
                };
                let target = self.curve(epoch, sample.now.saturating_since(epoch.start));
                self.cwnd = self.cwnd.max(target);
            }
            CongestionState::Recovery => {}
        }
    }

    fn on_loss(&mut self, kind: LossKind, now: SimTime) {
        let before = self.cwnd;
        let reduced = ((before as f64 * CUBIC_BETA) as u64).max(self.mss);
        let w_max_segments = before as f64 / self.mss as f64;
        let k = (w_max_segments * (1.0 - CUBIC_BETA) / CUBIC_C).cbrt();

        self.cwnd = reduced;
        self.ssthresh = reduced;
        self.start_epoch(now, before, k);
        self.state = match kind {
            LossKind::Timeout => CongestionState::CongestionAvoidance,
            LossKind::DuplicateAcks => CongestionState::Recovery,
        };
        tracing::debug!(
            ?kind,
            %now,
            cwnd_before = before,
            cwnd = self.cwnd,
            k_secs = k,
            "Cubic window reduced"
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

    const MSS: u64 = 1448;

    fn ack_at(now: SimTime) -> AckSample {
        AckSample {
            bytes_acked: MSS,
            now,
            smoothed_rtt: Some(Duration::from_millis(10)),
            app_limited: false,
        }
    }

    fn grown_cubic(segments: u64) -> Cubic {
        let mut cubic = Cubic::new(&TransportConfig::default());
        for _ in 1..segments {
            cubic.on_ack(&ack_at(SimTime::ZERO));
        }
        cubic
    }

    #[test]
    fn test_slow_start_before_first_loss() {
        let cubic = grown_cubic(10);
        assert_eq!(cubic.cwnd(), 10 * MSS);
        assert_eq!(cubic.state(), CongestionState::SlowStart);
        assert!(cubic.window_at(Duration::ZERO).is_none());
    }

    #[test]
    fn test_loss_applies_beta_and_sets_k() {
        let mut cubic = grown_cubic(20);
        cubic.on_loss(LossKind::DuplicateAcks, SimTime::from_secs(1));

        assert_eq!(cubic.cwnd(), (20.0 * MSS as f64 * CUBIC_BETA) as u64);
        assert_eq!(cubic.state(), CongestionState::Recovery);

        // K = cbrt(20 * 0.3 / 0.4) = cbrt(15)
        let k = cubic.k().unwrap().as_secs_f64();
        assert!((k - 15f64.cbrt()).abs() < 1e-9);
    }

    #[test]
    fn test_curve_starts_at_reduced_window_and_returns_to_w_max_at_k() {
        let mut cubic = grown_cubic(20);
        cubic.on_loss(LossKind::Timeout, SimTime::from_secs(1));

        let at_start = cubic.window_at(Duration::ZERO).unwrap();
        assert!(at_start.abs_diff(cubic.cwnd()) <= 1);

        let at_k = cubic.window_at(cubic.k().unwrap()).unwrap();
        assert_eq!(at_k, 20 * MSS);

        // Concave before K, convex after
        let k = cubic.k().unwrap().as_secs_f64();
        let early = cubic.window_at(Duration::from_secs_f64(k / 2.0)).unwrap();
        let late = cubic.window_at(Duration::from_secs_f64(k * 1.5)).unwrap();
        assert!(early > at_start && early < at_k);
        assert!(late > at_k);
    }

    #[test]
    fn test_growth_is_time_driven() {
        let mut cubic = grown_cubic(20);
        cubic.on_loss(LossKind::Timeout, SimTime::from_secs(1));
        let reduced = cubic.cwnd();

        // Many ACKs at the same instant do not grow the window
        for _ in 0..50 {
            cubic.on_ack(&ack_at(SimTime::from_secs(1)));
        }
        assert!(cubic.cwnd().abs_diff(reduced) <= 1);

        cubic.on_ack(&ack_at(SimTime::from_secs(3)));
        assert_eq!(
            cubic.cwnd(),
            cubic.window_at(Duration::from_secs(2)).unwrap()
        );
    }

    #[test]
    fn test_window_never_below_one_segment() {
        let mut cubic = Cubic::new(&TransportConfig::default());
        cubic.on_loss(LossKind::Timeout, SimTime::ZERO);
        cubic.on_loss(LossKind::Timeout, SimTime::from_secs(1));

        assert_eq!(cubic.cwnd(), MSS);
        assert!(cubic.window_at(Duration::ZERO).unwrap() >= MSS);
    }
}
