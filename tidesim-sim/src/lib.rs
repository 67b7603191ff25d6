//! Tidesim Simulation Scenarios - Traffic generators and reproducible experiments.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! This crate sits on top of `tidesim-core` and provides the applications
//! that drive transport endpoints plus a small library of scenarios that
//! exercise the congestion controllers under controlled conditions.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidesim_sim::scenarios::{self, PacedFlowScenario};
//! use tidesim_core::TidesimConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = scenarios::paced_flow(&PacedFlowScenario::default(), TidesimConfig::default())?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Applications**: packet sink, paced and constant-rate senders, bulk sender
//! - **Scenario builder**: isolated two-node topologies, one per flow
//! - **Reports**: per-flow statistics, window traces and loss events

pub mod apps;
pub mod scenarios;

pub use apps::{BulkSend, PacketSink, PeriodicHandle, PeriodicSend, SessionProgress};
pub use scenarios::{FlowReport, ScenarioBuilder, ScenarioKind, ScenarioReport};
use tidesim_core::{TidesimError, TopologyError};

/// Errors raised while assembling or running scenarios.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Failure inside the simulation engine
    #[error(transparent)]
    Core(#[from] TidesimError),

    /// Invalid topology operation
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Scenario or application parameters make no sense
    #[error("Invalid parameters: {reason}")]
    InvalidParameters {
        /// What was wrong
        reason: String,
    },
}
