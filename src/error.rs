//! Kith error module.
//!
//! There are specific types for errors (e.g. `NoSuchEntity`) and
//! additionally one `Error` type that can represent them all. Each error
//! in this module has an `Into<Error>` implementation.
//!
//! Everything else that can go wrong in this crate is a programmer error
//! (unknown component type, duplicate registration, out-of-bounds internal
//! removal, use after dispose) and panics with a message naming the
//! offender.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::world::Entity;

/// The Kith error type, able to represent all error types of this
/// library.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An operation referenced an entity that is not alive.
    NoSuchEntity(NoSuchEntity),
    /// A component lookup found no value for the entity.
    MissingComponent(MissingComponent),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::NoSuchEntity(e) => write!(f, "no such entity: {}", e),
            Error::MissingComponent(e) => write!(f, "missing component: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::NoSuchEntity(e) => Some(e),
            Error::MissingComponent(e) => Some(e),
        }
    }
}

impl From<NoSuchEntity> for Error {
    fn from(e: NoSuchEntity) -> Self {
        Error::NoSuchEntity(e)
    }
}

impl From<MissingComponent> for Error {
    fn from(e: MissingComponent) -> Self {
        Error::MissingComponent(e)
    }
}

/// An operation was attempted on an entity the world does not consider
/// alive, e.g. removing an entity twice.
///
/// Ids are recycled, so after the dead id is handed out again this error
/// is no longer raised for it; see the crate documentation on stale
/// handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoSuchEntity {
    /// The action that failed.
    pub action: &'static str,
    /// The entity that has been passed.
    pub entity: Entity,
}

impl Display for NoSuchEntity {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "tried to {} entity {:?}, but it is not alive",
            self.action, self.entity
        )
    }
}

impl StdError for NoSuchEntity {}

/// A mapper was asked for a component value the entity does not carry.
///
/// This is the payload behind the panic raised by the non-optional lookup
/// paths (`World::get`, `World::get_mut`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingComponent {
    /// The entity that was queried.
    pub entity: Entity,
    /// The component type that was missing.
    pub type_name: &'static str,
}

impl Display for MissingComponent {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "entity {:?} has no `{}` component",
            self.entity, self.type_name
        )
    }
}

impl StdError for MissingComponent {}
