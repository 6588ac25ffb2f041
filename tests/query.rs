mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;

use strata::engine::error::{ArgumentError, InvalidOperationError, StoreError};
use strata::engine::store::EntityStore;
use strata::engine::types::CHUNK_CAP;
use strata::Entity;

fn populated_store() -> (EntityStore, Vec<Entity>) {
    init_registry();
    let mut store = EntityStore::new();
    let mut entities = Vec::new();
    for i in 0..6 {
        let entity = store.create_entity().unwrap();
        store.add_component(entity, Position::new(i as f32, 0.0, 0.0)).unwrap();
        if i % 2 == 0 {
            store.add_component(entity, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
        }
        if i % 3 == 0 {
            store.add_tag::<TestTag>(entity).unwrap();
        }
        entities.push(entity);
    }
    (store, entities)
}

#[test]
fn query_matches_archetype_supersets() {
    let (store, _) = populated_store();

    let mut positions = store.query::<(Position,)>().build().unwrap();
    assert_eq!(positions.count(&store).unwrap(), 6);

    let mut moving = store.query::<(Position, Velocity)>().build().unwrap();
    let mut seen = Vec::new();
    moving
        .for_each(&store, |entity, (position, velocity)| {
            assert_eq!(velocity.dx, 1.0);
            seen.push((entity.id(), position.x));
        })
        .unwrap();
    seen.sort_by_key(|(id, _)| *id);
    assert_eq!(seen, vec![(1, 0.0), (3, 2.0), (5, 4.0)]);
}

#[test]
fn with_and_without_filters() {
    let (store, _) = populated_store();

    let mut tagged = store.query::<(Position,)>().with_tag::<TestTag>().build().unwrap();
    let mut ids: Vec<u32> = tagged.entities(&store).unwrap().into_iter().map(Entity::id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4]);

    let mut still = store.query::<(Position,)>().without::<Velocity>().build().unwrap();
    let mut ids: Vec<u32> = still.entities(&store).unwrap().into_iter().map(Entity::id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 4, 6]);

    let mut untagged_moving = store
        .query::<()>()
        .with::<Velocity>()
        .without_tag::<TestTag>()
        .build()
        .unwrap();
    let mut ids: Vec<u32> = untagged_moving.entities(&store).unwrap().into_iter().map(Entity::id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![3, 5]);
}

#[test]
fn cached_archetypes_extend_with_new_ones() {
    let (mut store, entities) = populated_store();
    let mut query = store.query::<(Position,)>().build().unwrap();
    let before = query.archetypes(&store).unwrap().len();
    assert_eq!(query.count(&store).unwrap(), 6);

    store.add_component(entities[1], Name { value: "late".to_string() }).unwrap();
    let other = store.create_entity().unwrap();
    store.add_component(other, Position::default()).unwrap();
    store.add_tag::<TestTag2>(other).unwrap();

    assert_eq!(query.archetypes(&store).unwrap().len(), before + 2);
    assert_eq!(query.count(&store).unwrap(), 7);
}

#[test]
fn for_each_mut_updates_values() {
    let (mut store, _) = populated_store();
    let mut query = store.query::<(Position, Velocity)>().build().unwrap();
    query
        .for_each_mut::<Position, _>(&mut store, |_, position| position.x += 10.0)
        .unwrap();

    let mut xs = Vec::new();
    store
        .query::<(Position,)>()
        .build()
        .unwrap()
        .for_each(&store, |_, (position,)| xs.push(position.x))
        .unwrap();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(xs, vec![1.0, 3.0, 5.0, 10.0, 12.0, 14.0]);
}

#[test]
fn for_each_mut_refuses_foreign_and_indexed_components() {
    let (mut store, _) = populated_store();
    let mut query = store.query::<(Position,)>().build().unwrap();
    assert!(matches!(
        query.for_each_mut::<Velocity, _>(&mut store, |_, _| {}),
        Err(StoreError::Argument(ArgumentError::ComponentNotInQuery { key: "vel" }))
    ));

    let mut scored = store.query::<(Score,)>().build().unwrap();
    assert!(matches!(
        scored.for_each_mut::<Score, _>(&mut store, |_, _| {}),
        Err(StoreError::InvalidOperation(InvalidOperationError::IndexedMutation { .. }))
    ));
}

#[test]
fn query_is_bound_to_its_store() {
    let (store, _) = populated_store();
    let other = EntityStore::new();
    let mut query = store.query::<(Position,)>().build().unwrap();
    assert!(matches!(
        query.count(&other),
        Err(StoreError::Argument(ArgumentError::ForeignQuery))
    ));
}

#[test]
fn index_filter_follows_index_order() {
    init_registry();
    let mut store = EntityStore::new();
    for score in [30, 10, 20, 40] {
        let entity = store.create_entity().unwrap();
        store.add_component(entity, Score(score)).unwrap();
        if score != 20 {
            store.add_component(entity, Position::default()).unwrap();
        }
    }

    let mut query = store
        .query::<(Score,)>()
        .with::<Position>()
        .value_in_range::<Score>(10, 30)
        .build()
        .unwrap();
    let mut seen = Vec::new();
    query.for_each(&store, |entity, (score,)| seen.push((entity.id(), score.0))).unwrap();
    assert_eq!(seen, vec![(2, 10), (1, 30)]);
    assert_eq!(query.count(&store).unwrap(), 2);
}

#[test]
fn chunks_expose_whole_blocks() {
    init_registry();
    let mut store = EntityStore::new();
    for i in 0..(CHUNK_CAP + 5) {
        let entity = store.create_entity().unwrap();
        store.add_component(entity, Position::new(i as f32, 0.0, 0.0)).unwrap();
    }

    let mut query = store.query::<(Position,)>().build().unwrap();
    let chunks = query.chunks::<Position>(&store).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].len(), CHUNK_CAP);
    assert_eq!(chunks[1].len(), 5);
    assert_eq!(chunks[1].entities.as_slice().len(), 5);
    assert_eq!(chunks[1].values.get(0).map(|p| p.x), Some(CHUNK_CAP as f32));

    let mut copy = Vec::new();
    chunks[0].values.copy_into(&mut copy);
    assert_eq!(copy.len(), CHUNK_CAP);

    assert!(matches!(
        query.chunks::<Velocity>(&store),
        Err(StoreError::Argument(ArgumentError::ComponentNotInQuery { .. }))
    ));
}

#[test]
fn par_for_each_visits_every_entity() {
    init_registry();
    let mut store = EntityStore::new();
    for i in 0..(3 * CHUNK_CAP + 17) {
        let entity = store.create_entity().unwrap();
        store.add_component(entity, Position::new(1.0, 0.0, 0.0)).unwrap();
        if i % 2 == 0 {
            store.add_component(entity, Velocity::default()).unwrap();
        }
    }

    let visited = AtomicUsize::new(0);
    let mut query = store.query::<(Position,)>().build().unwrap();
    query
        .par_for_each(&store, |_, (position,)| {
            assert_eq!(position.x, 1.0);
            visited.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    assert_eq!(visited.load(Ordering::Relaxed), 3 * CHUNK_CAP + 17);
}

#[test]
fn unregistered_types_fail_at_build() {
    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    struct Unknown;
    impl strata::Component for Unknown {
        const KEY: &'static str = "unknown-query-type";
    }

    init_registry();
    let store = EntityStore::new();
    assert!(matches!(
        store.query::<(Unknown,)>().build(),
        Err(StoreError::Registry(_))
    ));
    assert!(matches!(
        store.query::<(Position,)>().with::<Unknown>().build(),
        Err(StoreError::Registry(_))
    ));
}
