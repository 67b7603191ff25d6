//! Round-trip time estimation and retransmission timeout (RFC 6298).

use std::time::Duration;

use crate::config::TransportConfig;

/// Smoothed RTT estimator.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    granularity: Duration,
}

impl RttEstimator {
    /// Creates an estimator with no samples and the configured initial RTO.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            srtt: None,
            rttvar: Duration::ZERO,
            rto: config.initial_rto.clamp(config.min_rto, config.max_rto),
            min_rto: config.min_rto,
            max_rto: config.max_rto,
            granularity: config.clock_granularity,
        }
    }

    /// Folds a fresh RTT measurement into the estimate.
    pub fn on_sample(&mut self, rtt: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttvar = rtt / 2;
            }
            Some(srtt) => {
                // rttvar = 3/4 rttvar + 1/4 |srtt - R|, srtt = 7/8 srtt + 1/8 R
                self.rttvar = (self.rttvar * 3 + srtt.abs_diff(rtt)) / 4;
                self.srtt = Some((srtt * 7 + rtt) / 8);
            }
        }

        let srtt = self.srtt.unwrap_or(rtt);
        self.rto = (srtt + self.granularity.max(self.rttvar * 4)).clamp(self.min_rto, self.max_rto);
    }

    /// Smoothed RTT, once at least one sample was taken.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// RTT variation estimate.
    pub fn rtt_variance(&self) -> Duration {
        self.rttvar
    }

    /// Base retransmission timeout without backoff.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Timeout after `backoff` consecutive expirations: `rto * 2^backoff`, capped.
    pub fn backed_off(&self, backoff: u32) -> Duration {
        let factor = 1u32.checked_shl(backoff).unwrap_or(u32::MAX);
        self.rto
            .checked_mul(factor)
            .unwrap_or(self.max_rto)
            .min(self.max_rto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_rto_before_samples() {
        let rtt = RttEstimator::new(&TransportConfig::default());
        assert_eq!(rtt.rto(), Duration::from_secs(1));
        assert!(rtt.smoothed_rtt().is_none());
    }

    #[test]
    fn test_first_sample_sets_srtt_and_half_variance() {
        let mut rtt = RttEstimator::new(&TransportConfig::default());
        rtt.on_sample(Duration::from_millis(100));

        assert_eq!(rtt.smoothed_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(rtt.rtt_variance(), Duration::from_millis(50));
        // 100 + 4 * 50 = 300 ms
        assert_eq!(rtt.rto(), Duration::from_millis(300));
    }

    #[test]
    fn test_subsequent_samples_use_ewma() {
        let mut rtt = RttEstimator::new(&TransportConfig::default());
        rtt.on_sample(Duration::from_millis(100));
        rtt.on_sample(Duration::from_millis(200));

        // rttvar = (3 * 50 + 100) / 4 = 62.5, srtt = (7 * 100 + 200) / 8 = 112.5
        assert_eq!(rtt.rtt_variance(), Duration::from_micros(62_500));
        assert_eq!(rtt.smoothed_rtt(), Some(Duration::from_micros(112_500)));
        assert_eq!(rtt.rto(), Duration::from_micros(362_500));
    }

    #[test]
    fn test_rto_clamped_to_minimum() {
        let mut rtt = RttEstimator::new(&TransportConfig::default());
        rtt.on_sample(Duration::from_millis(4));
        assert_eq!(rtt.rto(), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let rtt = RttEstimator::new(&TransportConfig::default());
        assert_eq!(rtt.backed_off(0), Duration::from_secs(1));
        assert_eq!(rtt.backed_off(3), Duration::from_secs(8));
        assert_eq!(rtt.backed_off(10), Duration::from_secs(60));
        assert_eq!(rtt.backed_off(64), Duration::from_secs(60));
    }
}
