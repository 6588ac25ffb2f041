#![allow(dead_code)]

use std::sync::Once;

use serde::{Deserialize, Serialize};

use strata::engine::component::{register_component, register_indexed_component, register_tag, Component, IndexedComponent, Tag};
use strata::engine::error::StoreResult;
use strata::engine::store::EntityStore;

pub const ENTITIES_SMALL: usize = 10_000;
pub const ENTITIES_MED: usize = 100_000;

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Component for Position {
    const KEY: &'static str = "pos";
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Wealth {
    pub value: f32,
}

impl Component for Wealth {
    const KEY: &'static str = "wealth";
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Productivity {
    pub rate: f32,
}

impl Component for Productivity {
    const KEY: &'static str = "prod";
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Component for Rank {
    const KEY: &'static str = "rank";
}

impl IndexedComponent for Rank {
    type Value = u32;

    fn indexed_value(&self) -> u32 {
        self.0
    }
}

pub struct Active;

impl Tag for Active {
    const NAME: &'static str = "active";
}

static INIT: Once = Once::new();

pub fn init_components() {
    INIT.call_once(|| {
        register_component::<Position>().unwrap();
        register_component::<Wealth>().unwrap();
        register_component::<Productivity>().unwrap();
        register_indexed_component::<Rank>().unwrap();
        register_tag::<Active>().unwrap();
    });
}

/// Every entity gets `Position` and `Wealth`; every other one also
/// `Productivity`, every fourth one the `Active` tag.
pub fn populate(store: &mut EntityStore, count: usize) -> StoreResult<()> {
    for i in 0..count {
        let entity = store.create_entity()?;
        store.add_component(entity, Position { x: 0.0, y: 0.0 })?;
        store.add_component(entity, Wealth { value: 100.0 })?;
        if i % 2 == 0 {
            store.add_component(entity, Productivity { rate: 1.0 })?;
        }
        if i % 4 == 0 {
            store.add_tag::<Active>(entity)?;
        }
        store.add_component(entity, Rank((i % 1000) as u32))?;
    }
    Ok(())
}
