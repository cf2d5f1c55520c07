use action_bus::types::BusConfig;
use action_bus::{ActionType, Bus};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn dispatch_with_n_subscribers(n: usize) {
    let bus = Bus::new(BusConfig::default());
    let action_type: ActionType<u64> = ActionType::new("bench-tick");
    for _ in 0..n {
        bus.subscribe(&action_type, |v, _ctx| {
            black_box(*v);
            Ok(())
        }, &[]);
    }
    for i in 0..1000u64 {
        bus.dispatch(&action_type, i, &[]).unwrap();
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_throughput");
    for subscribers in [1usize, 8, 64] {
        group.bench_function(format!("{subscribers}_subscribers"), |b| {
            b.iter(|| dispatch_with_n_subscribers(subscribers));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
