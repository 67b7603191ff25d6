//! Read-only observation points for external instrumentation.

use std::time::Duration;

use serde::Serialize;

use crate::congestion::{CongestionAlgorithm, CongestionState, LossKind};
use crate::time::SimTime;

/// Upper bound on recorded window samples per endpoint.
pub const MAX_TRACE_SAMPLES: usize = 100_000;

/// Snapshot of an endpoint's sender and receiver state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub algorithm: CongestionAlgorithm,
    pub cwnd: u64,
    pub ssthresh: u64,
    pub congestion_state: CongestionState,
    pub bytes_in_flight: u64,
    pub buffered_bytes: u64,
    pub smoothed_rtt: Option<Duration>,
    pub rto: Duration,
    pub bytes_sent: u64,
    pub bytes_acked: u64,
    pub bytes_received: u64,
    pub segments_sent: u64,
    pub segments_acked: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub fast_retransmits: u64,
    pub loss_events: u64,
    pub first_retransmit_at: Option<SimTime>,
}

/// Congestion window observed at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CwndSample {
    pub time: SimTime,
    pub cwnd: u64,
    pub bytes_in_flight: u64,
}

/// Loss event as seen by the congestion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LossRecord {
    pub at: SimTime,
    pub kind: LossKind,
    pub cwnd_before: u64,
    pub cwnd_after: u64,
    /// Retransmission timeout in force when the loss was detected
    pub rto: Duration,
}
