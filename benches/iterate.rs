use criterion::*;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use strata::engine::store::EntityStore;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    init_components();

    let mut store = EntityStore::new();
    populate(&mut store, ENTITIES_MED).unwrap();

    let mut group = c.benchmark_group("iterate");

    group.bench_function("for_each_read_productivity_100k", |b| {
        let mut query = store.query::<(Productivity,)>().build().unwrap();
        b.iter(|| {
            let mut total = 0.0f32;
            query.for_each(&store, |_, (p,)| total += p.rate).unwrap();
            black_box(total);
        });
    });

    group.bench_function("par_for_each_read_wealth_100k", |b| {
        let mut query = store.query::<(Wealth,)>().build().unwrap();
        b.iter(|| {
            let seen = AtomicU64::new(0);
            query
                .par_for_each(&store, |_, (w,)| {
                    if w.value > 0.0 {
                        seen.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .unwrap();
            black_box(seen.into_inner());
        });
    });

    group.bench_function("for_each_mut_write_wealth_100k", |b| {
        let mut query = store.query::<(Wealth, Productivity)>().build().unwrap();
        b.iter(|| {
            query
                .for_each_mut::<Wealth, _>(&mut store, |_, w| w.value *= 1.0001)
                .unwrap();
        });
    });

    group.bench_function("chunks_sum_position_100k", |b| {
        let mut query = store.query::<(Position,)>().with_tag::<Active>().build().unwrap();
        b.iter(|| {
            let mut total = 0.0f32;
            for chunk in query.chunks::<Position>(&store).unwrap() {
                total += chunk.values.iter().map(|p| p.x + p.y).sum::<f32>();
            }
            black_box(total);
        });
    });

    group.bench_function("value_in_range_query_100k", |b| {
        let mut query = store
            .query::<(Wealth,)>()
            .value_in_range::<Rank>(100, 199)
            .build()
            .unwrap();
        b.iter(|| black_box(query.count(&store).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
