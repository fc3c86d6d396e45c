use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use uxf_session::{ManualClock, Session, SessionConfig, aggregate_results};

/// Session with `blocks` × `per_block` trials, each holding a handful of
/// results so that headers overlap but are not identical.
fn prepare_session(blocks: usize, per_block: usize) -> Session<ManualClock> {
    let config = SessionConfig {
        copy_session_settings: false,
        copy_participant_details: false,
        end_on_drop: false,
        ..SessionConfig::default()
    };
    let mut session = Session::with_clock(config, ManualClock::new());
    session.begin("bench", "P00", 1, None, None).unwrap();
    for _ in 0..blocks {
        session.create_block(per_block as i64).unwrap();
    }
    while session.begin_next_trial_safe().unwrap() {
        let n = session.current_trial_num();
        let trial = session.current_trial_mut().unwrap();
        trial.record("rt", 0.3 + n as f64 * 1e-3).unwrap();
        trial.record("response", "left,right").unwrap();
        trial.record(format!("cond_{}", n % 4), n as u64).unwrap();
    }
    session
}

pub fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_results");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));

    for &(blocks, per_block) in &[(4, 25), (10, 100), (20, 500)] {
        let session = prepare_session(blocks, per_block);
        group.bench_with_input(
            BenchmarkId::from_parameter(blocks * per_block),
            &session,
            |b, s| {
                b.iter(|| {
                    let table = aggregate_results(s.trials()).unwrap();
                    black_box(table.to_csv_lines());
                });
            },
        );
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .confidence_level(0.95)
        .noise_threshold(0.02)
        .significance_level(0.05);
    targets = bench_aggregate
}

criterion_main!(benches);
