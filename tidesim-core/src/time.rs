//! Simulated time and link data rates.
//!
//! Simulated time is an offset from simulation start and never consults
//! the wall clock, so two runs with the same inputs observe identical instants.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Instant on the simulated timeline, measured from simulation start.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "f64", from = "f64")]
pub struct SimTime(Duration);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    /// Creates an instant from an offset since simulation start.
    pub const fn from_duration(offset: Duration) -> Self {
        Self(offset)
    }

    /// Creates an instant `secs` seconds after simulation start.
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Creates an instant `millis` milliseconds after simulation start.
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Creates an instant from fractional seconds.
    ///
    /// Negative or non-finite values are rejected with `None`.
    pub fn try_from_secs_f64(secs: f64) -> Option<Self> {
        Duration::try_from_secs_f64(secs).ok().map(Self)
    }

    /// Creates an instant from fractional seconds.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is negative or not finite.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs))
    }

    /// Returns the offset since simulation start.
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns the offset since simulation start in fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Returns time elapsed since `earlier`, or zero if `earlier` is later.
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns the instant `offset` before this one, if it is not before simulation start.
    pub fn checked_sub(self, offset: Duration) -> Option<SimTime> {
        self.0.checked_sub(offset).map(Self)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.saturating_since(rhs)
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> f64 {
        time.as_secs_f64()
    }
}

impl From<f64> for SimTime {
    fn from(secs: f64) -> SimTime {
        SimTime::try_from_secs_f64(secs).unwrap_or_default()
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Error returned when a data rate string cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseDataRateError {
    /// Numeric part is missing or malformed
    #[error("Invalid data rate value: {input}")]
    InvalidValue {
        /// Original input
        input: String,
    },
    /// Unit suffix is not one of bps, kbps, Mbps, Gbps
    #[error("Unknown data rate unit '{unit}' (expected bps, kbps, Mbps or Gbps)")]
    UnknownUnit {
        /// Unit as written
        unit: String,
    },
}

/// Link capacity in bits per second.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DataRate {
    bits_per_second: u64,
}

impl DataRate {
    /// Creates a rate from bits per second.
    pub const fn from_bps(bits_per_second: u64) -> Self {
        Self { bits_per_second }
    }

    /// Creates a rate from kilobits per second.
    pub const fn from_kbps(kbps: u64) -> Self {
        Self::from_bps(kbps * 1_000)
    }

    /// Creates a rate from megabits per second.
    pub const fn from_mbps(mbps: u64) -> Self {
        Self::from_bps(mbps * 1_000_000)
    }

    /// Creates a rate from gigabits per second.
    pub const fn from_gbps(gbps: u64) -> Self {
        Self::from_bps(gbps * 1_000_000_000)
    }

    /// Returns the rate in bits per second.
    pub const fn bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    /// Returns the rate in bytes per second.
    pub fn bytes_per_second(self) -> f64 {
        self.bits_per_second as f64 / 8.0
    }

    /// Returns true for a zero rate, which cannot carry any data.
    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }

    /// Time needed to serialize `bytes` onto a channel of this rate.
    ///
    /// A zero rate yields `Duration::MAX`.
    pub fn transmission_time(self, bytes: u64) -> Duration {
        if self.bits_per_second == 0 {
            return Duration::MAX;
        }
        let nanos = u128::from(bytes) * 8 * 1_000_000_000 / u128::from(self.bits_per_second);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl FromStr for DataRate {
    type Err = ParseDataRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (value, unit) = trimmed.split_at(split);

        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| ParseDataRateError::InvalidValue {
                input: s.to_string(),
            })?;
        if !value.is_finite() || value < 0.0 {
            return Err(ParseDataRateError::InvalidValue {
                input: s.to_string(),
            });
        }

        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "bps" | "b/s" => 1.0,
            "kbps" | "kb/s" => 1e3,
            "mbps" | "mb/s" => 1e6,
            "gbps" | "gb/s" => 1e9,
            _ => {
                return Err(ParseDataRateError::UnknownUnit {
                    unit: unit.to_string(),
                });
            }
        };

        Ok(DataRate::from_bps((value * multiplier).round() as u64))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_second;
        if bps >= 1_000_000_000 && bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps >= 1_000_000 && bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps >= 1_000 && bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{bps}bps")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_arithmetic() {
        let start = SimTime::from_secs(2);
        let later = start + Duration::from_millis(100);

        assert_eq!(later.as_duration(), Duration::from_millis(2100));
        assert_eq!(later - start, Duration::from_millis(100));
        assert_eq!(start - later, Duration::ZERO);
        assert!(SimTime::try_from_secs_f64(-1.0).is_none());
        assert!(SimTime::try_from_secs_f64(f64::NAN).is_none());
    }

    #[test]
    fn test_data_rate_parsing() {
        assert_eq!("5Mbps".parse::<DataRate>().unwrap(), DataRate::from_mbps(5));
        assert_eq!("1Gbps".parse::<DataRate>().unwrap(), DataRate::from_gbps(1));
        assert_eq!("10kbps".parse::<DataRate>().unwrap(), DataRate::from_kbps(10));
        assert_eq!(
            "1.5 Mbps".parse::<DataRate>().unwrap(),
            DataRate::from_bps(1_500_000)
        );
        assert!(matches!(
            "fast".parse::<DataRate>(),
            Err(ParseDataRateError::InvalidValue { .. })
        ));
        assert!(matches!(
            "10furlongs".parse::<DataRate>(),
            Err(ParseDataRateError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_data_rate_display_round_trips_common_units() {
        assert_eq!(DataRate::from_mbps(5).to_string(), "5Mbps");
        assert_eq!(DataRate::from_gbps(1).to_string(), "1Gbps");
        assert_eq!(DataRate::from_bps(1_500).to_string(), "1500bps");
    }

    #[test]
    fn test_transmission_time() {
        // 1024 bytes at 5 Mbps = 8192 bits / 5e6 = 1.6384 ms
        let rate = DataRate::from_mbps(5);
        assert_eq!(rate.transmission_time(1024), Duration::from_nanos(1_638_400));
        assert_eq!(DataRate::from_bps(0).transmission_time(1), Duration::MAX);
    }

    #[test]
    fn test_sim_time_serializes_as_seconds() {
        let json = serde_json::to_string(&SimTime::from_millis(2500)).unwrap();
        assert_eq!(json, "2.5");
        let back: SimTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SimTime::from_millis(2500));
    }

    proptest::proptest! {
        #[test]
        fn transmission_time_grows_with_size(bps in 1_000u64..10_000_000_000, bytes in 0u64..1_000_000) {
            let rate = DataRate::from_bps(bps);
            proptest::prop_assert!(rate.transmission_time(bytes) <= rate.transmission_time(bytes + 1));
        }
    }
}
