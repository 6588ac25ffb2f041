mod common;

use std::any::Any;

use common::*;

use strata::engine::archetype::Archetype;
use strata::engine::component::component_id_of;
use strata::engine::error::ColumnError;
use strata::engine::storage::{ChunkedColumn, Column};
use strata::engine::types::{chunk_position, Signature, CHUNK_CAP};

#[test]
fn chunk_position_splits_rows() {
    assert_eq!(chunk_position(0), (0, 0));
    assert_eq!(chunk_position(CHUNK_CAP - 1), (0, CHUNK_CAP - 1));
    assert_eq!(chunk_position(CHUNK_CAP), (1, 0));
    assert_eq!(chunk_position(3 * CHUNK_CAP + 7), (3, 7));
}

#[test]
fn push_fills_blocks_in_order() {
    let mut column = ChunkedColumn::new();
    for i in 0..(CHUNK_CAP + 10) {
        assert_eq!(column.push(i as u32), i);
    }
    assert_eq!(column.len(), CHUNK_CAP + 10);
    assert_eq!(column.block_count(), 2);
    assert_eq!(column.block(0).len(), CHUNK_CAP);
    assert_eq!(column.block(1).len(), 10);
    assert_eq!(column.at(CHUNK_CAP), Some(&(CHUNK_CAP as u32)));
    assert_eq!(column.at(CHUNK_CAP + 10), None);
}

#[test]
fn growth_never_relocates_populated_rows() {
    let mut column = ChunkedColumn::new();
    for i in 0..CHUNK_CAP {
        column.push(i as u64);
    }
    let before = column.block(0).as_ptr();
    for i in 0..(3 * CHUNK_CAP) {
        column.push(i as u64);
    }
    assert_eq!(column.block(0).as_ptr(), before);
    assert_eq!(column.allocated_blocks(), 4);
}

#[test]
fn swap_remove_moves_last_row_into_hole() {
    let mut column = ChunkedColumn::new();
    for i in 0..5u32 {
        column.push(i);
    }
    let (removed, moved_from) = column.swap_remove(1).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(moved_from, Some(4));
    assert_eq!(column.iter().copied().collect::<Vec<_>>(), vec![0, 4, 2, 3]);

    let (removed, moved_from) = column.swap_remove(3).unwrap();
    assert_eq!(removed, 3);
    assert_eq!(moved_from, None);
    assert_eq!(column.len(), 3);

    assert_eq!(
        column.swap_remove(3).unwrap_err(),
        ColumnError::RowOutOfBounds { row: 3, len: 3 }
    );
}

#[test]
fn swap_remove_across_block_boundary_retains_blocks() {
    let mut column = ChunkedColumn::new();
    for i in 0..(CHUNK_CAP + 1) {
        column.push(i);
    }
    let (removed, moved_from) = column.swap_remove(0).unwrap();
    assert_eq!(removed, 0);
    assert_eq!(moved_from, Some(CHUNK_CAP));
    assert_eq!(column.at(0), Some(&CHUNK_CAP));
    assert_eq!(column.block_count(), 1);
    assert_eq!(column.allocated_blocks(), 2);
    assert_eq!(column.capacity(), 2 * CHUNK_CAP);

    column.push(7);
    assert_eq!(column.at(CHUNK_CAP), Some(&7));
    assert_eq!(column.allocated_blocks(), 2);
}

#[test]
fn chunk_views_cover_used_prefix() {
    let mut column = ChunkedColumn::new();
    for i in 0..(CHUNK_CAP + 3) {
        column.push(i as i32);
    }
    let chunks: Vec<_> = column.chunks().collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].len(), CHUNK_CAP);
    assert_eq!(chunks[1].len(), 3);
    assert_eq!(chunks[1].first_row(), CHUNK_CAP);
    assert_eq!(chunks[1].block_index(), 1);
    assert_eq!(chunks[1].get(2), Some(&(CHUNK_CAP as i32 + 2)));

    let mut copy = vec![99, 98];
    chunks[1].copy_into(&mut copy);
    assert_eq!(copy, vec![CHUNK_CAP as i32, CHUNK_CAP as i32 + 1, CHUNK_CAP as i32 + 2]);

    assert!(column.chunk(5).is_empty());
}

#[test]
fn clear_keeps_allocated_blocks() {
    let mut column = ChunkedColumn::new();
    for i in 0..(2 * CHUNK_CAP) {
        column.push(i);
    }
    column.clear();
    assert!(column.is_empty());
    assert_eq!(column.block_count(), 0);
    assert_eq!(column.allocated_blocks(), 2);
}

#[test]
fn erased_column_moves_rows_between_columns() {
    let mut source = ChunkedColumn::new();
    let mut target = ChunkedColumn::new();
    for i in 0..3 {
        source.push(Position::new(i as f32, 0.0, 0.0));
    }
    target.push(Position::new(-1.0, 0.0, 0.0));

    let (row, moved_from) = Column::move_row_to(&mut source, 0, &mut target).unwrap();
    assert_eq!(row, 1);
    assert_eq!(moved_from, Some(2));
    assert_eq!(target.at(1), Some(&Position::new(0.0, 0.0, 0.0)));
    assert_eq!(source.at(0), Some(&Position::new(2.0, 0.0, 0.0)));

    let mut wrong = ChunkedColumn::<Velocity>::new();
    let error = Column::move_row_to(&mut source, 0, &mut wrong).unwrap_err();
    assert!(matches!(error, ColumnError::TypeMismatch { .. }));
    assert_eq!(source.len(), 2);
}

#[test]
fn erased_column_rejects_wrong_boxed_type() {
    let mut column = ChunkedColumn::<Position>::new();
    let error = column.push_boxed(Box::new(Velocity::default())).unwrap_err();
    assert!(matches!(error, ColumnError::TypeMismatch { .. }));
    assert!(column.is_empty());

    column.push_boxed(Box::new(Position::new(1.0, 2.0, 3.0))).unwrap();
    column.replace_boxed(0, Box::new(Position::new(4.0, 5.0, 6.0))).unwrap();
    assert_eq!(column.at(0), Some(&Position::new(4.0, 5.0, 6.0)));

    let json = column.encode_json(0).unwrap().unwrap();
    assert_eq!(json.get(), r#"{"x":4.0,"y":5.0,"z":6.0}"#);
    assert!(column.encode_json(1).unwrap().is_none());
}

#[test]
fn archetype_rows_stay_aligned() {
    init_registry();
    let position = component_id_of::<Position>().unwrap();
    let velocity = component_id_of::<Velocity>().unwrap();

    let mut signature = Signature::default();
    signature.components.set(position);
    signature.components.set(velocity);
    let mut both = Archetype::new(1, signature).unwrap();

    let mut only_position = Signature::default();
    only_position.components.set(position);
    let mut single = Archetype::new(2, only_position).unwrap();

    for id in 1..=3u32 {
        let row = both
            .push_row(
                id,
                vec![
                    (velocity, Box::new(Velocity { dx: id as f32, dy: 0.0 }) as Box<dyn Any + Send>),
                    (position, Box::new(Position::new(id as f32, 0.0, 0.0)) as Box<dyn Any + Send>),
                ],
            )
            .unwrap();
        assert_eq!(row as u32, id - 1);
    }

    let moved = both.move_row_to(0, &mut single, Vec::new()).unwrap();
    assert_eq!(moved.destination_row, 0);
    assert_eq!(moved.displaced, Some(3));
    assert_eq!(both.entity_at(0), Some(3));
    assert_eq!(both.typed_column::<Position>(position).unwrap().at(0), Some(&Position::new(3.0, 0.0, 0.0)));
    assert_eq!(both.typed_column::<Velocity>(velocity).unwrap().at(0).map(|v| v.dx), Some(3.0));
    assert_eq!(single.entity_at(0), Some(1));
    assert_eq!(single.typed_column::<Position>(position).unwrap().at(0), Some(&Position::new(1.0, 0.0, 0.0)));

    assert_eq!(both.remove_row(1).unwrap(), None);
    assert_eq!(both.len(), 1);
    assert!(single.column(velocity).is_none());
}

#[test]
fn archetype_push_requires_full_signature() {
    init_registry();
    let position = component_id_of::<Position>().unwrap();
    let velocity = component_id_of::<Velocity>().unwrap();

    let mut signature = Signature::default();
    signature.components.set(position);
    signature.components.set(velocity);
    let mut archetype = Archetype::new(1, signature).unwrap();

    let error = archetype
        .push_row(1, vec![(position, Box::new(Position::default()) as Box<dyn Any + Send>)])
        .unwrap_err();
    assert_eq!(error, ColumnError::Misaligned);
    assert!(archetype.is_empty());
}
