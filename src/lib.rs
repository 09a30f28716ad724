#![warn(missing_docs)]

//! # Kith family ECS
//!
//! Kith is a lightweight, single-threaded Entity-Component-System library
//! for game and simulation loops. Entities are plain integer ids;
//! components are typed data attached to them in dense per-type mappers;
//! *families* are precomputed predicates over component composition
//! (`all_of` / `any_of` / `none_of`) whose member sets are maintained
//! incrementally on every mutation; systems iterate families once per
//! tick. Structural changes requested while a family is being iterated
//! are deferred and applied at the next safe point.
//!
//! ```
//! use kith::{FamilySpec, SystemDef, WorldBuilder};
//!
//! struct Pos {
//!     x: f32,
//! }
//! struct Vel {
//!     x: f32,
//! }
//! impl kith::Component for Pos {}
//! impl kith::Component for Vel {}
//!
//! let mut world = WorldBuilder::new()
//!     .register::<Pos>()
//!     .register::<Vel>()
//!     .system(SystemDef::iterating(
//!         "movement",
//!         FamilySpec::new().all_of::<Pos>().all_of::<Vel>(),
//!         |world, entity, dt| {
//!             let step = world.get::<Vel>(entity).x * dt;
//!             world.get_mut::<Pos>(entity).x += step;
//!         },
//!     ))
//!     .build();
//!
//! let e = world.create(|entity| {
//!     entity.add(Pos { x: 0.0 }).add(Vel { x: 1.0 });
//! });
//!
//! world.update(1.0);
//! assert_eq!(world.get::<Pos>(e).x, 1.0);
//! ```

pub use shrev::ReaderId;

pub use crate::bitset::BitArray;
pub use crate::error::{Error, MissingComponent, NoSuchEntity};
pub use crate::storage::{ComponentHooks, ComponentMapper, Hook};
pub use crate::system::{CompareFn, SystemDef};
pub use crate::world::{
    Component, Entities, Entity, EntityEdit, EntityEvent, FamilyHandle, FamilyListener,
    FamilySpec, Index, Injections, World, WorldBuilder,
};

mod bitset;
pub mod error;
pub mod prelude;
mod storage;
mod system;
mod world;
