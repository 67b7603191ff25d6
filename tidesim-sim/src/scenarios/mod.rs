//! Reproducible congestion-control experiments.
//!
//! A scenario is a set of flows, each on its own two-node topology, run to
//! a fixed stop time. Reports carry the sender's observation points so the
//! expected behavior of each experiment can be checked after the fact.

pub mod builders;
pub mod report;
pub mod runner;
pub mod types;

// Re-export main types
pub use builders::{DEFAULT_SINK_PORT, FlowSpec, ScenarioBuilder, ScenarioRun, Traffic};
pub use report::{FlowReport, ScenarioReport};
pub use runner::{
    ScenarioKind, comparison, loss_recovery, paced_flow, verify_comparison, verify_loss_recovery,
    verify_paced_flow,
};
pub use types::{ComparisonScenario, LossRecoveryScenario, PacedFlowScenario};
