//! Integration tests for Tidesim
//!
//! These tests drive the engine through its public API: scheduler ordering
//! properties, congestion controller invariants, end-to-end transport
//! behavior over simulated links and the reference scenarios.

#[path = "style.rs"]
mod style;

#[path = "integration/scheduler_properties.rs"]
mod scheduler_properties;

#[path = "integration/congestion_invariants.rs"]
mod congestion_invariants;

#[path = "integration/transport_flows.rs"]
mod transport_flows;

#[path = "integration/scenarios.rs"]
mod scenarios;
