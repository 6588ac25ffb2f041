#![allow(dead_code)]

use std::sync::Once;

use serde::{Deserialize, Serialize};

use strata::engine::component::{
    register_component, register_indexed_component, register_script, register_tag, Component,
    IndexedComponent, Script, Tag,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Component for Position {
    const KEY: &'static str = "pos";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

impl Component for Velocity {
    const KEY: &'static str = "vel";
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub value: String,
}

impl Component for Name {
    const KEY: &'static str = "name";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score(pub i32);

impl Component for Score {
    const KEY: &'static str = "score";
}

impl IndexedComponent for Score {
    type Value = i32;

    fn indexed_value(&self) -> i32 {
        self.0
    }
}

pub struct TestTag;

impl Tag for TestTag {
    const NAME: &'static str = "test-tag";
}

pub struct TestTag2;

impl Tag for TestTag2 {
    const NAME: &'static str = "test-tag2";
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScript1 {
    pub val1: i32,
}

impl Script for TestScript1 {
    const KEY: &'static str = "script1";
}

static INIT: Once = Once::new();

pub fn init_registry() {
    INIT.call_once(|| {
        register_component::<Position>().unwrap();
        register_component::<Velocity>().unwrap();
        register_component::<Name>().unwrap();
        register_indexed_component::<Score>().unwrap();
        register_tag::<TestTag>().unwrap();
        register_tag::<TestTag2>().unwrap();
        register_script::<TestScript1>().unwrap();
    });
}
