mod common;

use std::sync::{Arc, Mutex};

use common::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata::engine::component::component_id_of;
use strata::engine::config::{PidPolicy, StoreConfig, DEFAULT_MAX_ID};
use strata::engine::error::{ArgumentError, ColumnError, InvalidOperationError, StoreError};
use strata::engine::events::{ComponentAction, ComponentChanged, TagsChanged};
use strata::engine::store::{EntityStore, EMPTY_ARCHETYPE};
use strata::Entity;

/// Verifies every live entity is found at its recorded row.
fn assert_consistent(store: &EntityStore) {
    let mut live = 0;
    for id in 1..=store.node_max_id() {
        let Some(entity) = store.entity(id) else {
            continue;
        };
        live += 1;
        let node = store.node(id).unwrap();
        let archetype = store.archetype(node.archetype().unwrap()).unwrap();
        assert_eq!(archetype.entity_at(node.row()), Some(id), "row of entity {id}");
        assert_eq!(store.archetype_of(entity).unwrap().archetype_id(), archetype.archetype_id());
    }
    assert_eq!(live, store.entity_count());
    let rows: usize = store.archetypes().iter().map(|a| a.len()).sum();
    assert_eq!(rows, store.entity_count());
}

#[test]
fn create_entity_assigns_sequential_ids() {
    init_registry();
    let mut store = EntityStore::new();
    let a = store.create_entity().unwrap();
    let b = store.create_entity().unwrap();
    assert_eq!((a.id(), b.id()), (1, 2));
    assert_eq!(store.entity_count(), 2);
    assert_eq!(store.archetype_of(a).unwrap().archetype_id(), EMPTY_ARCHETYPE);
    assert_eq!(store.id_to_pid(2), Some(2));
    assert_eq!(store.pid_to_id(2), Some(2));
    assert_eq!(store.archetype_count(), 1);
}

#[test]
fn create_entity_with_id_validates_arguments() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity_with_id(10).unwrap();
    assert_eq!(entity.id(), 10);
    assert_eq!(store.node_max_id(), 10);

    let error = store.create_entity_with_id(0).unwrap_err();
    assert!(matches!(error, StoreError::Argument(ArgumentError::InvalidId { id: 0 })));
    assert_eq!(error.to_string(), "invalid entity id <= 0. was: 0");

    let error = store.create_entity_with_id(10).unwrap_err();
    assert!(matches!(error, StoreError::Argument(ArgumentError::IdInUse { id: 10 })));
    assert_eq!(error.to_string(), "id already in use in EntityStore. id: 10");

    // sequential ids skip explicitly created ones
    for expected in 1..=9 {
        assert_eq!(store.create_entity().unwrap().id(), expected);
    }
    assert_eq!(store.create_entity().unwrap().id(), 11);
}

#[test]
fn delete_then_recreate_with_same_id() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity_with_id(5).unwrap();
    store.add_component(entity, Position::new(1.0, 2.0, 3.0)).unwrap();
    store.delete_entity(entity).unwrap();
    assert_eq!(store.entity_count(), 0);
    assert!(store.entity(5).is_none());

    let recreated = store.create_entity_with_id(5).unwrap();
    assert_eq!(recreated.id(), 5);
    assert_ne!(recreated, entity);
    assert_eq!(store.get_component::<Position>(recreated).unwrap(), None);
    assert_eq!(store.archetype_of(recreated).unwrap().archetype_id(), EMPTY_ARCHETYPE);
}

#[test]
fn deleted_handles_fail_with_use_after_delete() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    let copy = entity;
    store.delete_entity(entity).unwrap();

    assert!(matches!(store.delete_entity(copy), Err(StoreError::UseAfterDelete(_))));
    assert!(matches!(
        store.add_component(copy, Position::default()),
        Err(StoreError::UseAfterDelete(_))
    ));
    assert!(!store.is_alive(copy));

    // the id is reused, the stale handle stays stale
    let reused = store.create_entity().unwrap();
    assert_eq!(reused.id(), entity.id());
    assert!(matches!(store.get_component::<Position>(copy), Err(StoreError::UseAfterDelete(_))));
}

#[test]
fn foreign_handles_are_rejected() {
    init_registry();
    let mut first = EntityStore::new();
    let mut second = EntityStore::new();
    let entity = first.create_entity().unwrap();
    second.create_entity().unwrap();

    assert!(matches!(
        second.add_component(entity, Position::default()),
        Err(StoreError::Argument(ArgumentError::ForeignEntity))
    ));
}

#[test]
fn add_and_remove_components_move_archetypes() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();

    assert!(store.add_component(entity, Position::new(1.0, 0.0, 0.0)).unwrap());
    assert!(store.add_component(entity, Velocity { dx: 2.0, dy: 0.0 }).unwrap());
    assert_eq!(store.archetype_count(), 3);
    assert_eq!(store.archetype_of(entity).unwrap().component_ids().len(), 2);

    // adding a present component replaces it in place
    assert!(!store.add_component(entity, Position::new(5.0, 0.0, 0.0)).unwrap());
    assert_eq!(store.get_component::<Position>(entity).unwrap(), Some(&Position::new(5.0, 0.0, 0.0)));
    assert_eq!(store.archetype_count(), 3);

    assert!(store.remove_component::<Position>(entity).unwrap());
    assert!(!store.remove_component::<Position>(entity).unwrap());
    assert!(!store.has_component::<Position>(entity).unwrap());
    assert_eq!(store.get_component::<Velocity>(entity).unwrap().map(|v| v.dx), Some(2.0));
    assert_eq!(store.archetype_count(), 4);
    assert_consistent(&store);
}

#[test]
fn set_component_requires_presence() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    assert!(!store.set_component(entity, Position::new(1.0, 1.0, 1.0)).unwrap());
    assert!(!store.has_component::<Position>(entity).unwrap());

    store.add_component(entity, Position::default()).unwrap();
    assert!(store.set_component(entity, Position::new(1.0, 1.0, 1.0)).unwrap());
    assert_eq!(store.get_component::<Position>(entity).unwrap(), Some(&Position::new(1.0, 1.0, 1.0)));
}

#[test]
fn get_component_mut_edits_in_place() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    store.add_component(entity, Position::default()).unwrap();
    store.get_component_mut::<Position>(entity).unwrap().unwrap().x = 9.0;
    assert_eq!(store.get_component::<Position>(entity).unwrap().map(|p| p.x), Some(9.0));

    store.add_component(entity, Score(1)).unwrap();
    let error = store.get_component_mut::<Score>(entity).unwrap_err();
    assert!(matches!(
        error,
        StoreError::InvalidOperation(InvalidOperationError::IndexedMutation { key: "score" })
    ));
}

#[test]
fn boxed_value_of_wrong_type_changes_nothing() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    let position = component_id_of::<Position>().unwrap();

    let error = store
        .add_component_boxed(entity, position, Box::new(Velocity::default()))
        .unwrap_err();
    assert!(matches!(error, StoreError::Storage(ColumnError::TypeMismatch { .. })));
    assert_eq!(store.archetype_of(entity).unwrap().archetype_id(), EMPTY_ARCHETYPE);
    assert_eq!(store.archetype_count(), 1);
}

#[test]
fn swap_compaction_fixes_displaced_rows() {
    init_registry();
    let mut store = EntityStore::new();
    let entities: Vec<Entity> = (0..4).map(|_| store.create_entity().unwrap()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        store.add_component(entity, Position::new(i as f32, 0.0, 0.0)).unwrap();
    }

    store.delete_entity(entities[0]).unwrap();
    assert_eq!(store.node(4).unwrap().row(), 0);
    assert_eq!(store.get_component::<Position>(entities[3]).unwrap().map(|p| p.x), Some(3.0));

    store.remove_component::<Position>(entities[1]).unwrap();
    assert_eq!(store.node(3).unwrap().row(), 1);
    assert_eq!(store.get_component::<Position>(entities[2]).unwrap().map(|p| p.x), Some(2.0));
    assert_consistent(&store);
}

#[test]
fn swap_compaction_survives_random_sequences() {
    init_registry();
    let mut rng = StdRng::seed_from_u64(7);
    let mut store = EntityStore::new();
    let mut live: Vec<(Entity, f32)> = Vec::new();

    for step in 0..3000 {
        match rng.gen_range(0..6) {
            0 | 1 => {
                let entity = store.create_entity().unwrap();
                let x = step as f32;
                store.add_component(entity, Position::new(x, 0.0, 0.0)).unwrap();
                live.push((entity, x));
            }
            2 if !live.is_empty() => {
                let (entity, _) = live.swap_remove(rng.gen_range(0..live.len()));
                store.delete_entity(entity).unwrap();
            }
            3 if !live.is_empty() => {
                let (entity, _) = live[rng.gen_range(0..live.len())];
                store.add_component(entity, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
            }
            4 if !live.is_empty() => {
                let (entity, _) = live[rng.gen_range(0..live.len())];
                store.remove_component::<Velocity>(entity).unwrap();
            }
            5 if !live.is_empty() => {
                let (entity, _) = live[rng.gen_range(0..live.len())];
                if store.has_tag::<TestTag>(entity).unwrap() {
                    store.remove_tag::<TestTag>(entity).unwrap();
                } else {
                    store.add_tag::<TestTag>(entity).unwrap();
                }
            }
            _ => {}
        }
    }

    assert_consistent(&store);
    for (entity, x) in &live {
        assert_eq!(store.get_component::<Position>(*entity).unwrap().map(|p| p.x), Some(*x));
    }
}

#[test]
fn tags_change_archetype_without_columns() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    store.add_component(entity, Position::new(1.0, 2.0, 3.0)).unwrap();

    assert!(store.add_tag::<TestTag>(entity).unwrap());
    assert!(!store.add_tag::<TestTag>(entity).unwrap());
    assert!(store.has_tag::<TestTag>(entity).unwrap());
    assert_eq!(store.tags_of(entity).unwrap().len(), 1);
    assert_eq!(store.archetype_of(entity).unwrap().component_ids().len(), 1);
    assert_eq!(store.get_component::<Position>(entity).unwrap(), Some(&Position::new(1.0, 2.0, 3.0)));

    assert!(store.remove_tag::<TestTag>(entity).unwrap());
    assert!(!store.remove_tag::<TestTag>(entity).unwrap());
    assert!(store.tags_of(entity).unwrap().is_empty());
}

#[test]
fn scripts_live_outside_archetypes() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();

    assert_eq!(store.add_script(entity, TestScript1 { val1: 1 }).unwrap(), None);
    assert_eq!(store.add_script(entity, TestScript1 { val1: 2 }).unwrap(), Some(TestScript1 { val1: 1 }));
    assert_eq!(store.script_count(entity).unwrap(), 1);
    assert_eq!(store.archetype_of(entity).unwrap().archetype_id(), EMPTY_ARCHETYPE);

    store.get_script_mut::<TestScript1>(entity).unwrap().unwrap().val1 = 3;
    assert_eq!(store.get_script::<TestScript1>(entity).unwrap(), Some(&TestScript1 { val1: 3 }));
    assert_eq!(store.remove_script::<TestScript1>(entity).unwrap(), Some(TestScript1 { val1: 3 }));
    assert_eq!(store.script_count(entity).unwrap(), 0);
}

#[test]
fn component_and_tag_events_are_emitted() {
    init_registry();
    let mut store = EntityStore::new();
    let components: Arc<Mutex<Vec<ComponentChanged>>> = Arc::default();
    let tags: Arc<Mutex<Vec<TagsChanged>>> = Arc::default();

    let sink = components.clone();
    let handler = store.on_component_changed(move |event| sink.lock().unwrap().push(*event));
    let sink = tags.clone();
    store.on_tags_changed(move |event| sink.lock().unwrap().push(*event));

    let entity = store.create_entity().unwrap();
    store.add_component(entity, Position::default()).unwrap();
    store.add_component(entity, Position::new(1.0, 0.0, 0.0)).unwrap();
    store.remove_component::<Position>(entity).unwrap();
    store.remove_component::<Position>(entity).unwrap();
    store.add_tag::<TestTag>(entity).unwrap();
    store.add_tag::<TestTag>(entity).unwrap();

    let actions: Vec<ComponentAction> = components.lock().unwrap().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![ComponentAction::Added, ComponentAction::Updated, ComponentAction::Removed]);
    assert!(components.lock().unwrap().iter().all(|e| e.entity_id == entity.id()));

    let tags = tags.lock().unwrap();
    assert_eq!(tags.len(), 1);
    assert!(tags[0].added);

    assert!(store.remove_component_changed_handler(handler));
    assert!(!store.remove_component_changed_handler(handler));
    store.add_component(entity, Position::default()).unwrap();
    assert_eq!(components.lock().unwrap().len(), 3);
}

#[test]
fn entities_iterates_live_ids_in_order() {
    init_registry();
    let mut store = EntityStore::new();
    let entities: Vec<Entity> = (0..5).map(|_| store.create_entity().unwrap()).collect();
    store.delete_entity(entities[1]).unwrap();
    store.delete_entity(entities[3]).unwrap();

    let ids: Vec<u32> = store.entities().map(|e| e.id()).collect();
    assert_eq!(ids, vec![1, 3, 5]);
    assert_eq!(store.node(2).unwrap().to_string(), "id: 2  flags: Null");
    assert_eq!(store.node(1).unwrap().to_string(), "id: 1  flags: Created");
}

#[test]
fn random_pids_are_mapped_and_reproducible() {
    init_registry();
    let config = StoreConfig {
        pid_policy: PidPolicy::RandomPids,
        random_seed: Some(42),
        node_capacity: 16,
        ..StoreConfig::default()
    };
    let mut first = EntityStore::with_config(config.clone());
    let mut second = EntityStore::with_config(config);

    let a: Vec<Entity> = (0..10).map(|_| first.create_entity().unwrap()).collect();
    let b: Vec<Entity> = (0..10).map(|_| second.create_entity().unwrap()).collect();

    for (x, y) in a.iter().zip(b.iter()) {
        let pid = first.id_to_pid(x.id()).unwrap();
        assert!(pid > 0);
        assert_eq!(second.id_to_pid(y.id()), Some(pid));
        assert_eq!(first.pid_to_id(pid), Some(x.id()));
        assert_eq!(first.entity_by_pid(pid), Some(*x));
    }

    let pid = first.id_to_pid(a[0].id()).unwrap();
    first.delete_entity(a[0]).unwrap();
    second.delete_entity(b[0]).unwrap();
    assert_eq!(first.pid_to_id(pid), None);

    first.set_random_seed(42);
    second.set_random_seed(42);
    let x = first.create_entity().unwrap();
    let y = second.create_entity().unwrap();
    assert_eq!(first.id_to_pid(x.id()), second.id_to_pid(y.id()));
}

#[test]
fn store_config_loads_from_toml() {
    let config = StoreConfig::from_toml_str("pid_policy = \"random_pids\"\nrandom_seed = 1234\n").unwrap();
    assert_eq!(config.pid_policy, PidPolicy::RandomPids);
    assert_eq!(config.random_seed, Some(1234));
    assert_eq!(config.node_capacity, 0);
    assert_eq!(config.max_id, DEFAULT_MAX_ID);

    let config = StoreConfig::from_toml_str("max_id = 64").unwrap();
    assert_eq!(config.max_id, 64);

    let config = StoreConfig::from_toml_str("").unwrap();
    assert_eq!(config, StoreConfig::default());

    assert!(StoreConfig::from_toml_str("pid_policy = \"sometimes\"").is_err());

    let store = EntityStore::with_pid_policy(PidPolicy::RandomPids);
    assert_eq!(store.pid_policy(), PidPolicy::RandomPids);
}

#[test]
fn ids_are_bounded_by_max_id() {
    init_registry();
    let mut store = EntityStore::with_config(StoreConfig { max_id: 3, ..StoreConfig::default() });

    let error = store.create_entity_with_id(4).unwrap_err();
    assert!(matches!(error, StoreError::Argument(ArgumentError::IdOutOfRange { id: 4, max: 3 })));
    let error = store.create_entity_with_id(u32::MAX).unwrap_err();
    assert!(matches!(error, StoreError::Argument(ArgumentError::IdOutOfRange { .. })));

    let entities: Vec<Entity> = (0..3).map(|_| store.create_entity().unwrap()).collect();
    assert_eq!(entities.last().map(|e| e.id()), Some(3));
    let error = store.create_entity().unwrap_err();
    assert!(matches!(error, StoreError::InvalidOperation(InvalidOperationError::IdSpaceExhausted)));

    // a freed id is handed out again
    store.delete_entity(entities[1]).unwrap();
    assert_eq!(store.create_entity().unwrap().id(), 2);
    assert_eq!(store.entity_count(), 3);
}
