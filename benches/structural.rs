use std::hint::black_box;

use criterion::*;

use strata::engine::commands::CommandBuffer;
use strata::engine::store::EntityStore;

mod common;
use common::*;

fn structural_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("structural");

    group.bench_function("create_populate_100k", |b| {
        b.iter(|| {
            let mut store = EntityStore::new();
            populate(&mut store, ENTITIES_MED).unwrap();
            black_box(store);
        });
    });

    group.bench_function("add_remove_component_100k", |b| {
        b.iter_batched(
            || {
                let mut store = EntityStore::new();
                populate(&mut store, ENTITIES_MED).unwrap();
                let entities: Vec<_> = store.entities().collect();
                (store, entities)
            },
            |(mut store, entities)| {
                for &entity in &entities {
                    store.add_component(entity, Productivity { rate: 2.0 }).unwrap();
                }
                for &entity in &entities {
                    store.remove_component::<Productivity>(entity).unwrap();
                }
                black_box(store);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("deferred_delete_half_100k", |b| {
        b.iter_batched(
            || {
                let mut store = EntityStore::new();
                populate(&mut store, ENTITIES_MED).unwrap();
                store
            },
            |mut store| {
                let mut commands = CommandBuffer::new();
                let mut query = store.query::<(Productivity,)>().build().unwrap();
                query.for_each(&store, |entity, _| commands.delete(entity)).unwrap();
                commands.apply(&mut store).unwrap();
                black_box(store);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("write_read_json_10k", |b| {
        b.iter_batched(
            || {
                let mut store = EntityStore::new();
                populate(&mut store, ENTITIES_SMALL).unwrap();
                store.write_store_json().unwrap()
            },
            |json| {
                let mut store = EntityStore::new();
                let result = store.read_store_json(&json);
                black_box(result.count);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, structural_benchmark);
criterion_main!(benches);
