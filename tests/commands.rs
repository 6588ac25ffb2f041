mod common;

use common::*;

use strata::engine::commands::{Command, CommandBuffer};
use strata::engine::error::{StoreError, UseAfterDeleteError};
use strata::engine::store::EntityStore;

#[test]
fn recorded_commands_apply_in_order() {
    init_registry();
    let mut store = EntityStore::new();
    let parent = store.create_entity().unwrap();
    let child = store.create_entity().unwrap();

    let mut commands = CommandBuffer::new();
    commands.add_component(child, Position::new(1.0, 0.0, 0.0)).unwrap();
    commands.add_component(child, Position::new(2.0, 0.0, 0.0)).unwrap();
    commands.add_tag::<TestTag>(child).unwrap();
    commands.add_child(parent, child);
    commands.add_component(parent, Velocity::default()).unwrap();
    commands.remove_component::<Velocity>(parent).unwrap();
    assert_eq!(commands.len(), 6);

    assert_eq!(commands.apply(&mut store).unwrap(), 6);
    assert!(commands.is_empty());

    assert_eq!(store.get_component::<Position>(child).unwrap().map(|p| p.x), Some(2.0));
    assert!(store.has_tag::<TestTag>(child).unwrap());
    assert_eq!(store.parent_of(child).unwrap(), Some(parent));
    assert!(!store.has_component::<Velocity>(parent).unwrap());
}

#[test]
fn deletes_recorded_during_iteration() {
    init_registry();
    let mut store = EntityStore::new();
    for score in 0..10 {
        let entity = store.create_entity().unwrap();
        store.add_component(entity, Score(score)).unwrap();
    }

    let mut commands = CommandBuffer::new();
    let mut query = store.query::<(Score,)>().build().unwrap();
    query
        .for_each(&store, |entity, (score,)| {
            if score.0 % 2 == 1 {
                commands.delete(entity);
            }
        })
        .unwrap();
    commands.apply(&mut store).unwrap();

    assert_eq!(store.entity_count(), 5);
    assert_eq!(query.count(&store).unwrap(), 5);
    let left: Vec<i32> = store
        .value_in_range::<Score>(&0, &9)
        .unwrap()
        .into_iter()
        .map(|entity| store.get_component::<Score>(entity).unwrap().unwrap().0)
        .collect();
    assert_eq!(left, vec![0, 2, 4, 6, 8]);
}

#[test]
fn apply_stops_at_first_failure() {
    init_registry();
    let mut store = EntityStore::new();
    let first = store.create_entity().unwrap();
    let second = store.create_entity().unwrap();

    let mut commands = CommandBuffer::new();
    commands.add_tag::<TestTag>(first).unwrap();
    commands.delete(second);
    commands.add_tag::<TestTag>(second).unwrap();
    commands.add_tag::<TestTag2>(first).unwrap();

    let error = commands.apply(&mut store).unwrap_err();
    assert!(matches!(error, StoreError::UseAfterDelete(UseAfterDeleteError { id }) if id == second.id()));
    assert!(commands.is_empty());

    assert!(store.has_tag::<TestTag>(first).unwrap());
    assert!(!store.has_tag::<TestTag2>(first).unwrap());
    assert!(!store.is_alive(second));
}

#[test]
fn mistyped_raw_command_is_rejected_on_apply() {
    init_registry();
    let mut store = EntityStore::new();
    let entity = store.create_entity().unwrap();
    let component_id = strata::component_id_of::<Position>().unwrap();

    let mut commands = CommandBuffer::new();
    commands.push(Command::AddComponent { entity, component_id, value: Box::new(Velocity::default()) });
    assert_eq!(format!("{:?}", commands), format!("CommandBuffer {{ commands: [AddComponent({entity}, {component_id})] }}"));

    assert!(commands.apply(&mut store).is_err());
    assert!(!store.has_component::<Position>(entity).unwrap());
}
