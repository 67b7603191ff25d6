//! Reference scenarios run end to end.

use tidesim_core::congestion::LossKind;
use tidesim_core::transport::CwndSample;
use tidesim_core::{CongestionAlgorithm, TidesimConfig};
use tidesim_sim::scenarios::{
    self, ComparisonScenario, LossRecoveryScenario, PacedFlowScenario, ScenarioKind,
};

#[test]
fn test_paced_flow_grows_then_plateaus() {
    let report = ScenarioKind::A.run(TidesimConfig::default()).unwrap();
    let violations = ScenarioKind::A.verify(&report);
    assert!(violations.is_empty(), "{violations:?}");

    let flow = &report.flows[0];
    let mss = u64::from(report.mss);
    // One earned ack in slow start, every later ack arrives with spare window
    assert_eq!(flow.peak_cwnd(), mss + 1024);
    assert_eq!(flow.sender.cwnd, mss + 1024);
    assert_eq!(flow.progress.messages_sent, 10);
    assert!(flow.progress.finished);
}

#[test]
fn test_paced_flow_with_cubic_delivers_everything() {
    let params = PacedFlowScenario {
        algorithm: CongestionAlgorithm::Cubic,
        ..Default::default()
    };
    let report = scenarios::paced_flow(&params, TidesimConfig::default()).unwrap();
    let violations = scenarios::verify_paced_flow(&report, &params);
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn test_comparison_flows_stay_within_windows() {
    let report = ScenarioKind::B.run(TidesimConfig::default()).unwrap();
    let violations = ScenarioKind::B.verify(&report);
    assert!(violations.is_empty(), "{violations:?}");

    let reno = report.flow("new-reno").unwrap();
    let cubic = report.flow("cubic").unwrap();
    assert_eq!(reno.algorithm, CongestionAlgorithm::NewReno);
    assert_eq!(cubic.algorithm, CongestionAlgorithm::Cubic);
    // Offered load is far below link capacity: nothing is lost
    for flow in [reno, cubic] {
        assert!(flow.losses.is_empty());
        assert_eq!(flow.link.queue_drops, 0);
        assert_eq!(flow.bytes_delivered, flow.progress.bytes_sent);
    }
}

#[test]
fn test_comparison_offered_load_matches_rate() {
    let params = ComparisonScenario::default();
    let report = scenarios::comparison(&params, TidesimConfig::default()).unwrap();

    // 1024 bytes every 8.192 ms for nine seconds
    let interval = params.offered_rate.transmission_time(params.packet_size);
    let window = params.stop_at.saturating_since(params.start_at);
    let expected = (window.as_nanos() / interval.as_nanos()) as u64;
    for flow in &report.flows {
        let sent = flow.progress.messages_sent;
        assert!(sent.abs_diff(expected) <= 1, "sent {sent}, expected about {expected}");
    }
}

#[test]
fn test_loss_recovery_new_reno() {
    let report = ScenarioKind::C.run(TidesimConfig::default()).unwrap();
    let violations = ScenarioKind::C.verify(&report);
    assert!(violations.is_empty(), "{violations:?}");

    let flow = &report.flows[0];
    let loss = flow.losses[0];
    assert_eq!(loss.kind, LossKind::DuplicateAcks);
    assert!(loss.at >= LossRecoveryScenario::default().loss_at);
    assert_eq!(flow.sender.fast_retransmits, 1);
    assert_eq!(flow.sender.timeouts, 0);
}

#[test]
fn test_loss_reduction_leaves_flight_above_window() {
    let report = ScenarioKind::C.run(TidesimConfig::default()).unwrap();
    let flow = &report.flows[0];
    let loss_at = flow.losses[0].at;

    let (before, after): (Vec<&CwndSample>, Vec<&CwndSample>) =
        flow.cwnd_trace.iter().partition(|sample| sample.time < loss_at);
    assert!(
        before
            .iter()
            .all(|sample| sample.bytes_in_flight <= sample.cwnd)
    );
    assert!(
        after
            .iter()
            .any(|sample| sample.bytes_in_flight > sample.cwnd)
    );
    assert!(!flow.window_respected());
}

#[test]
fn test_loss_recovery_cubic() {
    let params = LossRecoveryScenario {
        algorithm: CongestionAlgorithm::Cubic,
        ..Default::default()
    };
    let report = scenarios::loss_recovery(&params, TidesimConfig::default()).unwrap();
    let violations = scenarios::verify_loss_recovery(&report);
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn test_runs_are_deterministic() {
    for kind in ScenarioKind::ALL {
        let first = kind.run(TidesimConfig::default()).unwrap();
        let second = kind.run(TidesimConfig::default()).unwrap();
        assert_eq!(first.events_executed, second.events_executed, "scenario {kind}");
        assert_eq!(
            first.to_json().unwrap(),
            second.to_json().unwrap(),
            "scenario {kind}"
        );
    }
}

#[test]
fn test_random_loss_follows_seed() {
    let run = |seed: u64| {
        let mut config = TidesimConfig::default();
        config.link.random_loss_rate = 0.01;
        config.simulation.seed = seed;
        let params = LossRecoveryScenario {
            stop_time: tidesim_core::SimTime::from_secs(3),
            ..Default::default()
        };
        scenarios::loss_recovery(&params, config).unwrap()
    };

    let a = run(7);
    let b = run(7);
    assert_eq!(a.flows[0].link.random_drops, b.flows[0].link.random_drops);
    assert_eq!(a.flows[0].sender.bytes_acked, b.flows[0].sender.bytes_acked);
    assert!(a.flows[0].link.random_drops > 0);
}

#[test]
fn test_report_serializes_to_json() {
    let report = ScenarioKind::A.run(TidesimConfig::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["name"], "a");
    assert_eq!(json["flows"][0]["algorithm"], "new-reno");
    assert_eq!(json["flows"][0]["bytes_delivered"], 10 * 1024);
    assert!(json["flows"][0]["cwnd_trace"].as_array().unwrap().len() > 1);
    assert!(report.summary().contains("new-reno"));
}
