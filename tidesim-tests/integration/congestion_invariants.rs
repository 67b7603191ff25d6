//! Window invariants shared by every congestion controller.

use std::time::Duration;

use proptest::prelude::*;
use tidesim_core::config::TransportConfig;
use tidesim_core::congestion::{
    AckSample, CUBIC_BETA, CongestionControl, CongestionState, Cubic, LossKind,
};
use tidesim_core::{CongestionAlgorithm, SimTime};

#[derive(Debug, Clone)]
enum Step {
    Ack { bytes: u64, app_limited: bool },
    Loss(LossKind),
    RecoveryExit,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (1u64..3 * 1448, any::<bool>())
            .prop_map(|(bytes, app_limited)| Step::Ack { bytes, app_limited }),
        1 => prop_oneof![Just(LossKind::Timeout), Just(LossKind::DuplicateAcks)].prop_map(Step::Loss),
        1 => Just(Step::RecoveryExit),
    ]
}

fn algorithm() -> impl Strategy<Value = CongestionAlgorithm> {
    prop_oneof![Just(CongestionAlgorithm::NewReno), Just(CongestionAlgorithm::Cubic)]
}

proptest! {
    #[test]
    fn window_never_below_one_segment_and_moves_in_the_right_direction(
        algorithm in algorithm(),
        steps in prop::collection::vec(step(), 1..300),
    ) {
        let config = TransportConfig::default();
        let mss = u64::from(config.mss);
        let mut cc = algorithm.build(&config);
        let mut now = SimTime::ZERO;

        for step in steps {
            now += Duration::from_millis(10);
            let before = cc.cwnd();
            match step {
                Step::Ack { bytes, app_limited } => {
                    let state = cc.state();
                    cc.on_ack(&AckSample {
                        bytes_acked: bytes,
                        now,
                        smoothed_rtt: Some(Duration::from_millis(20)),
                        app_limited,
                    });
                    prop_assert!(cc.cwnd() >= before, "ack shrank the window");
                    if app_limited || state == CongestionState::Recovery {
                        prop_assert_eq!(cc.cwnd(), before);
                    }
                }
                Step::Loss(kind) => {
                    cc.on_loss(kind, now);
                    prop_assert!(
                        cc.cwnd() <= before,
                        "loss grew the window from {} to {}",
                        before,
                        cc.cwnd()
                    );
                    prop_assert_ne!(cc.state(), CongestionState::SlowStart);
                    prop_assert_eq!(
                        cc.state() == CongestionState::Recovery,
                        kind == LossKind::DuplicateAcks
                    );
                }
                Step::RecoveryExit => {
                    cc.on_recovery_exit(now);
                    prop_assert_ne!(cc.state(), CongestionState::Recovery);
                }
            }
            prop_assert!(cc.cwnd() >= mss);
        }
    }
}

#[test]
fn test_new_reno_slow_start_doubles_per_round() {
    let config = TransportConfig::default();
    let mss = u64::from(config.mss);
    let mut cc = CongestionAlgorithm::NewReno.build(&config);
    let mut now = SimTime::ZERO;

    for round in 0..4u32 {
        let window = cc.cwnd();
        for _ in 0..window / mss {
            now += Duration::from_millis(1);
            cc.on_ack(&AckSample {
                bytes_acked: mss,
                now,
                smoothed_rtt: None,
                app_limited: false,
            });
        }
        assert_eq!(cc.cwnd(), mss << (round + 1));
    }
    assert_eq!(cc.state(), CongestionState::SlowStart);
}

#[test]
fn test_new_reno_avoidance_adds_about_one_segment_per_window() {
    let config = TransportConfig {
        initial_ssthresh: 10 * 1448,
        initial_cwnd_segments: 10,
        ..Default::default()
    };
    let mss = u64::from(config.mss);
    let mut cc = CongestionAlgorithm::NewReno.build(&config);
    assert_eq!(cc.cwnd(), 10 * mss);

    // Reaching ssthresh with the first ack moves into avoidance
    cc.on_ack(&AckSample {
        bytes_acked: mss,
        now: SimTime::from_millis(1),
        smoothed_rtt: None,
        app_limited: false,
    });
    assert_eq!(cc.state(), CongestionState::CongestionAvoidance);

    let start = cc.cwnd();
    for i in 0..start / mss {
        cc.on_ack(&AckSample {
            bytes_acked: mss,
            now: SimTime::from_millis(2 + i),
            smoothed_rtt: None,
            app_limited: false,
        });
    }
    let grown = cc.cwnd() - start;
    assert!(grown > mss / 2 && grown <= mss, "grew {grown} bytes in one window");
}

#[test]
fn test_cubic_recovers_towards_previous_maximum() {
    let config = TransportConfig {
        initial_cwnd_segments: 100,
        initial_ssthresh: 100 * 1448,
        ..Default::default()
    };
    let mss = u64::from(config.mss);
    let mut cc = CongestionAlgorithm::Cubic.build(&config);
    let w_max = cc.cwnd();

    cc.on_loss(LossKind::DuplicateAcks, SimTime::from_secs(1));
    assert_eq!(cc.cwnd(), (w_max as f64 * CUBIC_BETA) as u64);
    assert!(cc.cwnd().abs_diff(70 * mss) <= 1);
    cc.on_recovery_exit(SimTime::from_secs(1));

    // K = cbrt(100 * 0.3 / 0.4) seconds, about 4.2 s
    let mut now = SimTime::from_secs(1);
    while now < SimTime::from_millis(5_300) {
        now += Duration::from_millis(50);
        cc.on_ack(&AckSample {
            bytes_acked: mss,
            now,
            smoothed_rtt: Some(Duration::from_millis(50)),
            app_limited: false,
        });
    }
    assert!(cc.cwnd() >= w_max, "cwnd {} never returned to {w_max}", cc.cwnd());
}

#[test]
fn test_cubic_curve_is_continuous_between_losses() {
    let config = TransportConfig {
        initial_cwnd_segments: 50,
        initial_ssthresh: 50 * 1448,
        ..Default::default()
    };
    let mss = u64::from(config.mss);
    let mut cubic = Cubic::new(&config);
    assert!(cubic.window_at(Duration::ZERO).is_none());

    cubic.on_loss(LossKind::Timeout, SimTime::from_secs(1));
    let mut previous = cubic.window_at(Duration::ZERO).unwrap();
    assert!(previous.abs_diff(cubic.cwnd()) <= 1);

    for ms in 1..=10_000u64 {
        let window = cubic.window_at(Duration::from_millis(ms)).unwrap();
        assert!(
            window.abs_diff(previous) < mss,
            "jump from {previous} to {window} at {ms} ms"
        );
        previous = window;
    }
}
