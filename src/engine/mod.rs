//! # Engine Module
//!
//! Internal store implementation.
//!
//! This module contains all core building blocks such as:
//! - Type registry and record keys
//! - Chunked column storage and archetypes
//! - Entity management, tree links and events
//! - Component indexes
//! - Query execution and deferred commands
//! - The JSON record codec
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod component;
pub mod storage;
pub mod index;
pub mod archetype;
pub mod entity;
pub mod events;
pub mod random;
pub mod config;
pub mod store;
pub mod tree;
pub mod query;
pub mod serialize;
pub mod commands;
