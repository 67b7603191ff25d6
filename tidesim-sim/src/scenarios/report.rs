//! Scenario results.

use std::fmt::Write as _;

use serde::Serialize;
use tidesim_core::network::LinkStats;
use tidesim_core::transport::{ConnectionState, CwndSample, EndpointStats, LossRecord};
use tidesim_core::{CongestionAlgorithm, SimTime};

use crate::apps::ProgressSnapshot;

/// Outcome of one flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    /// Flow label
    pub label: String,
    /// Sender congestion control
    pub algorithm: CongestionAlgorithm,
    /// Sender state at the end of the run
    pub final_state: ConnectionState,
    /// Sender observation points
    pub sender: EndpointStats,
    /// In-order bytes delivered to the sink
    pub bytes_delivered: u64,
    /// Application progress
    pub progress: ProgressSnapshot,
    /// Counters of the flow's link
    pub link: LinkStats,
    /// Sender congestion window over time
    pub cwnd_trace: Vec<CwndSample>,
    /// Loss events detected by the sender
    pub losses: Vec<LossRecord>,
}

impl FlowReport {
    /// Largest congestion window observed.
    pub fn peak_cwnd(&self) -> u64 {
        self.cwnd_trace
            .iter()
            .map(|sample| sample.cwnd)
            .max()
            .unwrap_or(self.sender.cwnd)
    }

    /// Returns true if bytes in flight never exceeded the congestion window.
    ///
    /// Only meaningful for loss-free flows: a loss reduction shrinks the
    /// window below data already in flight, which then drains without new sends.
    pub fn window_respected(&self) -> bool {
        self.cwnd_trace
            .iter()
            .all(|sample| sample.bytes_in_flight <= sample.cwnd)
    }
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Segment size used by all flows
    pub mss: u32,
    /// Simulated time when the run ended
    pub final_time: SimTime,
    /// Events executed during the run
    pub events_executed: u64,
    /// Per-flow results
    pub flows: Vec<FlowReport>,
}

impl ScenarioReport {
    /// Looks up a flow by label.
    pub fn flow(&self, label: &str) -> Option<&FlowReport> {
        self.flows.iter().find(|flow| flow.label == label)
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// - `serde_json::Error` - If serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Scenario {} finished at {} after {} events",
            self.name, self.final_time, self.events_executed
        );
        for flow in &self.flows {
            let srtt = flow
                .sender
                .smoothed_rtt
                .map(|rtt| format!("{:.3}ms", rtt.as_secs_f64() * 1000.0))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {:<10} {:<8} state={:<12} delivered={}B acked={}B cwnd={}B peak={}B srtt={} \
                 retransmits={} timeouts={} losses={}",
                flow.label,
                flow.algorithm,
                flow.final_state.to_string(),
                flow.bytes_delivered,
                flow.sender.bytes_acked,
                flow.sender.cwnd,
                flow.peak_cwnd(),
                srtt,
                flow.sender.retransmissions,
                flow.sender.timeouts,
                flow.losses.len(),
            );
            for loss in &flow.losses {
                let _ = writeln!(
                    out,
                    "    loss at {} ({:?}): cwnd {} -> {}",
                    loss.at, loss.kind, loss.cwnd_before, loss.cwnd_after
                );
            }
        }
        out
    }
}
