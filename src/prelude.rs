//! Prelude module.
//!
//! Contains all of the most common types, re-exported for convenience.

pub use crate::{
    BitArray, Component, ComponentHooks, ComponentMapper, Entity, EntityEdit, EntityEvent,
    FamilyHandle, FamilyListener, FamilySpec, SystemDef, World, WorldBuilder,
};
