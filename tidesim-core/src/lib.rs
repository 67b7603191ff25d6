//! Tidesim Core - Discrete-event network simulation engine
//!
//! This crate provides the building blocks for simulating reliable transport
//! over point-to-point links: a deterministic event scheduler, a link model,
//! a TCP-like transport endpoint and pluggable congestion control.

pub mod config;
pub mod congestion;
pub mod network;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod tracing_setup;
pub mod transport;

// Re-export main types for convenient access
pub use config::TidesimConfig;
pub use congestion::{CongestionAlgorithm, CongestionControl};
pub use network::{Address, EndpointId, LinkId, NetScheduler, Network, NodeId, TopologyError};
pub use scheduler::{EventHandle, Scheduler, SchedulerError};
pub use simulation::Simulation;
pub use time::{DataRate, SimTime};
pub use transport::{SocketNotice, TransportError};

/// Core errors that can bubble up from any Tidesim subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TidesimError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Logging setup failed: {reason}")]
    Logging { reason: String },
}

impl TidesimError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            TidesimError::Scheduler(e) => match e {
                SchedulerError::InvalidDelay { reason } => format!("Invalid schedule: {reason}"),
                SchedulerError::QueueOverflow { count } => {
                    format!("Simulation aborted: {count} events pending")
                }
                SchedulerError::TimeWentBackwards { .. } => {
                    "Simulation aborted: internal timing error".to_string()
                }
            },
            TidesimError::Transport(e) => match e {
                TransportError::ConnectionRefused { peer } => {
                    format!("Connection refused by {peer}")
                }
                TransportError::SendAfterClose => "Cannot send on a closed connection".to_string(),
                _ => "Transport error occurred".to_string(),
            },
            TidesimError::Topology(e) => format!("Invalid topology: {e}"),
            TidesimError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            TidesimError::Logging { reason } => format!("Could not set up logging: {reason}"),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TidesimError::Configuration { .. }
                | TidesimError::Topology(_)
                | TidesimError::Scheduler(SchedulerError::InvalidDelay { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, TidesimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        let config = TidesimError::Configuration {
            reason: "mss must be greater than zero".to_string(),
        };
        assert!(config.is_user_error());
        assert_eq!(
            config.user_message(),
            "Invalid configuration: mss must be greater than zero"
        );

        let overflow = TidesimError::from(SchedulerError::QueueOverflow { count: 10 });
        assert!(!overflow.is_user_error());
        assert_eq!(overflow.user_message(), "Simulation aborted: 10 events pending");

        let logging = TidesimError::Logging {
            reason: "cannot create logs".to_string(),
        };
        assert!(!logging.is_user_error());
        assert_eq!(logging.user_message(), "Could not set up logging: cannot create logs");
    }
}
