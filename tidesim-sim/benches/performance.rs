use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use tidesim_core::scheduler::Scheduler;
use tidesim_core::{CongestionAlgorithm, SimTime, TidesimConfig};
use tidesim_sim::scenarios::{self, LossRecoveryScenario, ScenarioKind};

fn bench_scheduler_throughput(c: &mut Criterion) {
    c.bench_function("scheduler_100k_events", |b| {
        b.iter(|| {
            let mut scheduler: Scheduler<u64> = Scheduler::new();
            for i in 0..100_000u64 {
                scheduler.schedule(Duration::from_micros(i % 977), |count: &mut u64, _| {
                    *count += 1
                });
            }
            let mut count = 0u64;
            scheduler.run(&mut count).unwrap();
            black_box(count)
        });
    });
}

fn bench_scenarios(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios");
    group.sample_size(10);

    group.bench_function("paced_flow", |b| {
        b.iter(|| black_box(ScenarioKind::A.run(TidesimConfig::default()).unwrap()))
    });

    group.bench_function("loss_recovery_cubic", |b| {
        let params = LossRecoveryScenario {
            algorithm: CongestionAlgorithm::Cubic,
            stop_time: SimTime::from_secs(6),
            ..Default::default()
        };
        b.iter(|| black_box(scenarios::loss_recovery(&params, TidesimConfig::default()).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_scheduler_throughput, bench_scenarios);
criterion_main!(benches);
