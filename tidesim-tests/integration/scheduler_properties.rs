//! Ordering and cancellation properties of the event scheduler.

use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;
use tidesim_core::scheduler::{Scheduler, SchedulerError};
use tidesim_core::SimTime;

type Log = Vec<(SimTime, usize)>;

fn schedule_all(scheduler: &mut Scheduler<Log>, delays: &[u64]) -> Vec<tidesim_core::EventHandle> {
    delays
        .iter()
        .enumerate()
        .map(|(index, &delay)| {
            scheduler.schedule(Duration::from_millis(delay), move |log: &mut Log, s| {
                log.push((s.now(), index))
            })
        })
        .collect()
}

proptest! {
    #[test]
    fn events_run_in_time_then_insertion_order(delays in prop::collection::vec(0u64..50, 1..200)) {
        let mut scheduler = Scheduler::new();
        schedule_all(&mut scheduler, &delays);

        let mut log = Log::new();
        let summary = scheduler.run(&mut log).unwrap();
        prop_assert_eq!(summary.events_executed, delays.len() as u64);
        prop_assert_eq!(log.len(), delays.len());

        for pair in log.windows(2) {
            let ((t0, i0), (t1, i1)) = (pair[0], pair[1]);
            prop_assert!(t0 <= t1);
            if t0 == t1 {
                prop_assert!(i0 < i1, "tie broken out of insertion order");
            }
        }
        for &(time, index) in &log {
            prop_assert_eq!(time, SimTime::from_millis(delays[index]));
        }
    }

    #[test]
    fn cancelled_events_never_run(
        delays in prop::collection::vec(1u64..100, 1..100),
        cancel_mask in prop::collection::vec(any::<bool>(), 100),
    ) {
        let mut scheduler = Scheduler::new();
        let handles = schedule_all(&mut scheduler, &delays);

        let mut cancelled = HashSet::new();
        for (index, handle) in handles.iter().enumerate() {
            if cancel_mask[index] {
                prop_assert!(scheduler.cancel(*handle));
                prop_assert!(!scheduler.cancel(*handle), "second cancel must be a no-op");
                cancelled.insert(index);
            }
        }

        let mut log = Log::new();
        scheduler.run(&mut log).unwrap();
        let ran: HashSet<usize> = log.iter().map(|&(_, index)| index).collect();
        prop_assert_eq!(ran.len(), delays.len() - cancelled.len());
        prop_assert!(ran.is_disjoint(&cancelled));
        for handle in handles {
            prop_assert!(!scheduler.is_pending(handle));
        }
    }
}

#[test]
fn test_action_scheduled_during_run_executes_later() {
    let mut scheduler: Scheduler<Log> = Scheduler::new();
    scheduler.schedule(Duration::from_millis(5), |log: &mut Log, s| {
        log.push((s.now(), 0));
        s.schedule(Duration::ZERO, |log: &mut Log, s| log.push((s.now(), 1)));
    });
    scheduler.schedule(Duration::from_millis(5), |log: &mut Log, s| log.push((s.now(), 2)));

    let mut log = Log::new();
    scheduler.run(&mut log).unwrap();

    // Zero-delay events queue behind events already due at the same instant
    let order: Vec<usize> = log.iter().map(|&(_, index)| index).collect();
    assert_eq!(order, vec![0, 2, 1]);
    assert!(log.iter().all(|&(time, _)| time == SimTime::from_millis(5)));
}

#[test]
fn test_cancel_after_execution_returns_false() {
    let mut scheduler: Scheduler<Log> = Scheduler::new();
    let handle = scheduler.schedule(Duration::from_millis(1), |log: &mut Log, s| {
        log.push((s.now(), 0))
    });
    let mut log = Log::new();
    scheduler.run(&mut log).unwrap();

    assert!(!scheduler.cancel(handle));
    assert_eq!(log.len(), 1);
}

#[test]
fn test_scheduling_in_the_past_is_rejected() {
    let mut scheduler: Scheduler<Log> = Scheduler::new();
    scheduler.schedule(Duration::from_secs(2), |_: &mut Log, _| {});
    let mut log = Log::new();
    scheduler.run(&mut log).unwrap();

    let result = scheduler.schedule_at(SimTime::from_secs(1), |_: &mut Log, _| {});
    assert!(matches!(result, Err(SchedulerError::InvalidDelay { .. })));
    assert!(matches!(
        scheduler.schedule_secs(-0.5, |_: &mut Log, _| {}),
        Err(SchedulerError::InvalidDelay { .. })
    ));
}

#[test]
fn test_run_until_stops_at_boundary() {
    let mut scheduler: Scheduler<Log> = Scheduler::new();
    schedule_all(&mut scheduler, &[10, 20, 30]);

    let mut log = Log::new();
    let summary = scheduler.run_until(&mut log, SimTime::from_millis(20)).unwrap();
    assert_eq!(summary.events_executed, 2);
    assert_eq!(scheduler.now(), SimTime::from_millis(20));
    assert_eq!(scheduler.pending_events(), 1);
}
