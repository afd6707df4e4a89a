use criterion::{Criterion, black_box, criterion_group, criterion_main};

use titrator_core::pulse::{ChunkPlan, PeriodSplit, PulseTrain};

pub fn bench_pulse_batches(c: &mut Criterion) {
    let mut g = c.benchmark_group("pulse_train");
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }

    let train = PulseTrain::new(19, 500, PeriodSplit::Quarter);
    g.bench_function("batch_5000", |b| {
        b.iter(|| black_box(train.batch(black_box(5_000))))
    });
    g.bench_function("batch_250", |b| {
        b.iter(|| black_box(train.batch(black_box(250))))
    });
    g.bench_function("plan_full_burette", |b| {
        // one full burette of travel at the reference calibration
        b.iter(|| black_box(ChunkPlan::for_steps(black_box(62_711))))
    });
    g.finish();
}

criterion_group!(benches, bench_pulse_batches);
criterion_main!(benches);
