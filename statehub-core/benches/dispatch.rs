use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use statehub_core::{Consumer, StateBag, Store};

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_state_fan_out");

    for subscribers in [1usize, 10, 100] {
        let store = Store::new();
        let _subs: Vec<_> = (0..subscribers)
            .map(|_| {
                store.watch("n", |_, value| {
                    black_box(value);
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.set_state("n", json!(i));
            });
        });
    }

    group.finish();
}

fn bench_bound_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("bound_consumer_update");

    for bound in [1usize, 50, 500] {
        let store = Store::new();
        let bag = Arc::new(StateBag::new());
        let names: Vec<String> = (0..bound).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        store.bind_states(&bag, &refs, None);

        // Cost of one change should not depend on how many names are bound.
        group.bench_with_input(BenchmarkId::from_parameter(bound), &bound, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.set_state("s0", json!(i));
            });
        });

        store.unbind_states(bag.consumer_id(), None);
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_bound_update);
criterion_main!(benches);
