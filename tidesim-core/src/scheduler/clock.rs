//! Time control and random number generation for deterministic simulations.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::SchedulerError;
use crate::time::SimTime;

/// Simulation clock.
///
/// Time only moves forward and is independent of wall-clock time.
/// It is constant between event executions.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    current_time: SimTime,
}

impl SimClock {
    /// Creates new clock starting at simulation time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Advances simulation time to specific instant.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::TimeWentBackwards` - If target time is in the past
    pub fn advance_to(&mut self, target: SimTime) -> Result<(), SchedulerError> {
        if target < self.current_time {
            return Err(SchedulerError::TimeWentBackwards {
                now: self.current_time,
                target,
            });
        }
        self.current_time = target;
        Ok(())
    }
}

/// Seeded random source for link loss.
///
/// Two links built from the same seed drop the same packets.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns true with the given probability; values outside `[0, 1]` saturate.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        if probability.is_nan() || probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.rng.random_bool(probability)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_clock_advancement() {
        let mut clock = SimClock::new();
        assert_eq!(clock.now(), SimTime::ZERO);

        clock.advance_to(SimTime::from_secs(10)).unwrap();
        assert_eq!(clock.now().as_duration(), Duration::from_secs(10));

        // Advancing to the current instant is allowed
        clock.advance_to(SimTime::from_secs(10)).unwrap();
    }

    #[test]
    fn test_clock_cannot_go_backwards() {
        let mut clock = SimClock::new();
        clock.advance_to(SimTime::from_secs(10)).unwrap();

        let result = clock.advance_to(SimTime::from_secs(5));
        assert!(matches!(
            result,
            Err(SchedulerError::TimeWentBackwards { .. })
        ));
        assert_eq!(clock.now(), SimTime::from_secs(10));
    }

    #[test]
    fn test_same_seed_drops_same_packets() {
        let mut rng1 = DeterministicRng::from_seed(12345);
        let mut rng2 = DeterministicRng::from_seed(12345);
        let mut other = DeterministicRng::from_seed(54321);

        let draws1: Vec<bool> = (0..64).map(|_| rng1.random_bool(0.5)).collect();
        let draws2: Vec<bool> = (0..64).map(|_| rng2.random_bool(0.5)).collect();
        let draws3: Vec<bool> = (0..64).map(|_| other.random_bool(0.5)).collect();

        assert_eq!(draws1, draws2);
        assert_ne!(draws1, draws3);
    }

    #[test]
    fn test_probability_saturates_at_bounds() {
        let mut rng = DeterministicRng::from_seed(7);

        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(!rng.random_bool(-0.5));
            assert!(!rng.random_bool(f64::NAN));
            assert!(rng.random_bool(1.0));
            assert!(rng.random_bool(3.0));
        }
    }
}
