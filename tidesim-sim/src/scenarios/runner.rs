//! The three reference experiments and the checks their results must pass.

use std::fmt;
use std::str::FromStr;

use tidesim_core::TidesimConfig;
use tidesim_core::congestion::{CUBIC_BETA, CongestionAlgorithm, LossKind};

use super::builders::{FlowSpec, ScenarioBuilder, Traffic};
use super::report::{FlowReport, ScenarioReport};
use super::types::{ComparisonScenario, LossRecoveryScenario, PacedFlowScenario};
use crate::SimError;

/// Port the comparison sinks listen on.
const COMPARISON_PORT: u16 = 8080;

/// Reference experiments selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Paced single flow: slow start then an application-limited plateau
    A,
    /// NewReno and Cubic side by side at a constant offered rate
    B,
    /// Bulk transfer recovering from one injected loss
    C,
}

impl ScenarioKind {
    /// All experiments in order.
    pub const ALL: [ScenarioKind; 3] = [ScenarioKind::A, ScenarioKind::B, ScenarioKind::C];

    /// Runs the experiment with its default parameters.
    ///
    /// # Errors
    ///
    /// - `SimError` - If the scenario cannot be assembled or the run aborts
    pub fn run(self, config: TidesimConfig) -> Result<ScenarioReport, SimError> {
        match self {
            ScenarioKind::A => paced_flow(&PacedFlowScenario::default(), config),
            ScenarioKind::B => comparison(&ComparisonScenario::default(), config),
            ScenarioKind::C => loss_recovery(&LossRecoveryScenario::default(), config),
        }
    }

    /// Checks the experiment's expected behavior and lists every violation.
    pub fn verify(self, report: &ScenarioReport) -> Vec<String> {
        match self {
            ScenarioKind::A => verify_paced_flow(report, &PacedFlowScenario::default()),
            ScenarioKind::B => verify_comparison(report),
            ScenarioKind::C => verify_loss_recovery(report),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioKind::A => "a",
            ScenarioKind::B => "b",
            ScenarioKind::C => "c",
        };
        f.write_str(name)
    }
}

impl FromStr for ScenarioKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "paced" => Ok(ScenarioKind::A),
            "b" | "comparison" => Ok(ScenarioKind::B),
            "c" | "loss" | "loss-recovery" => Ok(ScenarioKind::C),
            other => Err(SimError::InvalidParameters {
                reason: format!("unknown scenario {other}, expected a, b or c"),
            }),
        }
    }
}

/// Runs the paced single-flow experiment.
///
/// # Errors
///
/// - `SimError` - If the scenario cannot be assembled or the run aborts
pub fn paced_flow(
    params: &PacedFlowScenario,
    config: TidesimConfig,
) -> Result<ScenarioReport, SimError> {
    let flow = FlowSpec::new(
        "paced",
        Traffic::Paced {
            message_size: params.message_size,
            count: params.messages,
            interval: params.interval,
            start_at: params.start_at,
        },
    )
    .algorithm(params.algorithm)
    .link(params.data_rate, params.delay)
    .sink(super::builders::DEFAULT_SINK_PORT, params.sink_start)
    .connect_at(params.connect_at);

    ScenarioBuilder::new("a")
        .config(config)
        .stop_time(params.stop_time)
        .flow(flow)
        .run()
}

/// Runs the constant-rate comparison, one isolated flow per algorithm.
///
/// # Errors
///
/// - `SimError` - If the scenario cannot be assembled or the run aborts
pub fn comparison(
    params: &ComparisonScenario,
    config: TidesimConfig,
) -> Result<ScenarioReport, SimError> {
    let mut builder = ScenarioBuilder::new("b")
        .config(config)
        .stop_time(params.stop_time);
    for algorithm in params.algorithms {
        let flow = FlowSpec::new(
            algorithm.to_string(),
            Traffic::OnOff {
                rate: params.offered_rate,
                packet_size: params.packet_size,
                start_at: params.start_at,
                stop_at: params.stop_at,
            },
        )
        .algorithm(algorithm)
        .link(params.data_rate, params.delay)
        .sink(COMPARISON_PORT, params.sink_start)
        .connect_at(params.start_at);
        builder = builder.flow(flow);
    }
    builder.run()
}

/// Runs the window-limited bulk transfer with one injected loss.
///
/// # Errors
///
/// - `SimError` - If the scenario cannot be assembled or the run aborts
pub fn loss_recovery(
    params: &LossRecoveryScenario,
    mut config: TidesimConfig,
) -> Result<ScenarioReport, SimError> {
    config.transport.receive_window = params.receive_window;
    let flow = FlowSpec::new(
        "bulk",
        Traffic::Bulk {
            message_size: params.message_size,
            messages: params.messages,
            start_at: params.start_at,
            close_when_done: false,
        },
    )
    .algorithm(params.algorithm)
    .link(params.data_rate, params.delay)
    .connect_at(params.connect_at)
    .inject_loss_at(params.loss_at);

    ScenarioBuilder::new("c")
        .config(config)
        .stop_time(params.stop_time)
        .flow(flow)
        .run()
}

/// Every message delivered, window grew out of slow start and then stopped growing.
pub fn verify_paced_flow(report: &ScenarioReport, params: &PacedFlowScenario) -> Vec<String> {
    let mut violations = Vec::new();
    let Some(flow) = report.flows.first() else {
        return vec!["report has no flows".to_string()];
    };

    let expected = params.message_size * params.messages;
    if flow.sender.bytes_acked != expected {
        violations.push(format!(
            "{} bytes acknowledged, expected {expected}",
            flow.sender.bytes_acked
        ));
    }
    if flow.bytes_delivered != expected {
        violations.push(format!(
            "{} bytes delivered, expected {expected}",
            flow.bytes_delivered
        ));
    }

    let initial = flow.cwnd_trace.first().map(|sample| sample.cwnd);
    if initial.is_none_or(|initial| flow.peak_cwnd() <= initial) {
        violations.push("congestion window never grew".to_string());
    }
    if flow.sender.cwnd != flow.peak_cwnd() {
        violations.push(format!(
            "window ended at {} below its peak {}",
            flow.sender.cwnd,
            flow.peak_cwnd()
        ));
    }
    if !flow.losses.is_empty() {
        violations.push(format!("{} unexpected loss events", flow.losses.len()));
    }
    violations
}

/// Both flows carried traffic, respected their windows and delivered comparable volumes.
pub fn verify_comparison(report: &ScenarioReport) -> Vec<String> {
    let mut violations = Vec::new();
    if report.flows.len() != 2 {
        violations.push(format!("expected 2 flows, found {}", report.flows.len()));
        return violations;
    }

    for flow in &report.flows {
        if flow.bytes_delivered == 0 {
            violations.push(format!("flow {} delivered nothing", flow.label));
        }
        if !flow.window_respected() {
            violations.push(format!("flow {} exceeded its window", flow.label));
        }
    }

    let delivered: Vec<u64> = report.flows.iter().map(|f| f.bytes_delivered).collect();
    let (low, high) = (delivered[0].min(delivered[1]), delivered[0].max(delivered[1]));
    if low == 0 || high / low >= 10 {
        violations.push(format!(
            "delivered volumes {} and {} differ by an order of magnitude",
            delivered[0], delivered[1]
        ));
    }
    violations
}

/// Exactly one loss event, window reduced per the algorithm, retransmission within one RTO.
pub fn verify_loss_recovery(report: &ScenarioReport) -> Vec<String> {
    let mut violations = Vec::new();
    let Some(flow) = report.flows.first() else {
        return vec!["report has no flows".to_string()];
    };

    if flow.link.injected_drops != 1 {
        violations.push(format!(
            "{} injected drops, expected 1",
            flow.link.injected_drops
        ));
    }
    if flow.link.queue_drops != 0 {
        violations.push(format!("{} unexpected queue drops", flow.link.queue_drops));
    }

    let [loss] = flow.losses.as_slice() else {
        violations.push(format!(
            "{} loss events, expected exactly 1",
            flow.losses.len()
        ));
        return violations;
    };

    if loss.kind != LossKind::DuplicateAcks {
        violations.push(format!("loss detected by {:?}, expected duplicate acks", loss.kind));
    }
    let expected = reduced_window(flow, loss.cwnd_before, u64::from(report.mss));
    if loss.cwnd_after != expected {
        violations.push(format!(
            "window reduced {} -> {}, expected {expected}",
            loss.cwnd_before, loss.cwnd_after
        ));
    }

    match (
        flow.link.injected_drop_times.first(),
        flow.sender.first_retransmit_at,
    ) {
        (Some(&dropped), Some(retransmitted)) => {
            let gap = retransmitted.saturating_since(dropped);
            if gap > loss.rto {
                violations.push(format!(
                    "retransmission {gap:?} after the drop exceeds the RTO {:?}",
                    loss.rto
                ));
            }
        }
        _ => violations.push("dropped segment was never retransmitted".to_string()),
    }
    violations
}

fn reduced_window(flow: &FlowReport, before: u64, mss: u64) -> u64 {
    match flow.algorithm {
        CongestionAlgorithm::NewReno => (before / 2).max(2 * mss).min(before),
        CongestionAlgorithm::Cubic => ((before as f64 * CUBIC_BETA) as u64).max(mss),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_kind_parsing() {
        assert_eq!("A".parse::<ScenarioKind>().unwrap(), ScenarioKind::A);
        assert_eq!("loss".parse::<ScenarioKind>().unwrap(), ScenarioKind::C);
        assert!("d".parse::<ScenarioKind>().is_err());
        assert_eq!(ScenarioKind::B.to_string(), "b");
    }

    #[test]
    fn test_paced_flow_plateaus() {
        let report = ScenarioKind::A.run(TidesimConfig::default()).unwrap();
        let violations = ScenarioKind::A.verify(&report);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_loss_recovery_single_loss_event() {
        for algorithm in [CongestionAlgorithm::NewReno, CongestionAlgorithm::Cubic] {
            let params = LossRecoveryScenario {
                algorithm,
                ..Default::default()
            };
            let report = loss_recovery(&params, TidesimConfig::default()).unwrap();
            let violations = verify_loss_recovery(&report);
            assert!(violations.is_empty(), "{algorithm}: {violations:?}");
        }
    }
}
