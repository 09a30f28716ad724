//! System definitions and the per-tick pipeline bookkeeping.
//!
//! A system is one of two kinds: an *interval* system whose body runs as a
//! whole once its tick cadence elapses, and an *iterating* system bound to
//! a family, whose body runs once per member of the family's iteration
//! snapshot. The pipeline stores both uniformly and dispatches on the
//! kind.

use std::cmp::Ordering;

use log::warn;

use crate::world::builder::Injections;
use crate::world::family::{FamilyHandle, FamilySpec};
use crate::world::{Entity, World};

pub(crate) type TickFn = dyn FnMut(&mut World, f32);
pub(crate) type AlphaFn = dyn FnMut(&mut World, f32);
pub(crate) type EntityTickFn = dyn FnMut(&mut World, Entity, f32);

/// An entity ordering used to sort a family's member cache before
/// iteration.
pub type CompareFn = dyn Fn(&World, Entity, Entity) -> Ordering;

/// A system body, or a factory that builds one from the injection
/// registry at world construction.
enum Provider<F: ?Sized> {
    Direct(Box<F>),
    Factory(Box<dyn FnOnce(&Injections) -> Box<F>>),
}

impl<F: ?Sized> Provider<F> {
    fn resolve(self, injections: &Injections) -> Box<F> {
        match self {
            Provider::Direct(body) => body,
            Provider::Factory(make) => make(injections),
        }
    }
}

enum SystemDefKind {
    Interval {
        on_tick: Provider<TickFn>,
        on_alpha: Option<Box<AlphaFn>>,
    },
    Iterating {
        spec: FamilySpec,
        on_tick_entity: Provider<EntityTickFn>,
        comparator: Option<Box<CompareFn>>,
    },
}

/// A declarative system definition, handed to
/// [`WorldBuilder::system`](crate::WorldBuilder::system).
///
/// Systems run in definition order, once per `every` ticks (default:
/// every tick), while enabled.
pub struct SystemDef {
    name: String,
    enabled: bool,
    every: u32,
    kind: SystemDefKind,
}

impl SystemDef {
    /// An interval system: `on_tick` runs as a whole each time the cadence
    /// elapses.
    pub fn interval<F>(name: impl Into<String>, on_tick: F) -> Self
    where
        F: FnMut(&mut World, f32) + 'static,
    {
        SystemDef {
            name: name.into(),
            enabled: true,
            every: 1,
            kind: SystemDefKind::Interval {
                on_tick: Provider::Direct(Box::new(on_tick)),
                on_alpha: None,
            },
        }
    }

    /// An interval system whose body is built from the injection registry
    /// when the world is constructed.
    pub fn interval_from<M>(name: impl Into<String>, make: M) -> Self
    where
        M: FnOnce(&Injections) -> Box<TickFn> + 'static,
    {
        SystemDef {
            name: name.into(),
            enabled: true,
            every: 1,
            kind: SystemDefKind::Interval {
                on_tick: Provider::Factory(Box::new(make)),
                on_alpha: None,
            },
        }
    }

    /// An iterating system bound to the family described by `spec`;
    /// `on_tick_entity` runs once per member.
    pub fn iterating<F>(name: impl Into<String>, spec: FamilySpec, on_tick_entity: F) -> Self
    where
        F: FnMut(&mut World, Entity, f32) + 'static,
    {
        SystemDef {
            name: name.into(),
            enabled: true,
            every: 1,
            kind: SystemDefKind::Iterating {
                spec,
                on_tick_entity: Provider::Direct(Box::new(on_tick_entity)),
                comparator: None,
            },
        }
    }

    /// An iterating system whose body is built from the injection registry
    /// when the world is constructed.
    pub fn iterating_from<M>(name: impl Into<String>, spec: FamilySpec, make: M) -> Self
    where
        M: FnOnce(&Injections) -> Box<EntityTickFn> + 'static,
    {
        SystemDef {
            name: name.into(),
            enabled: true,
            every: 1,
            kind: SystemDefKind::Iterating {
                spec,
                on_tick_entity: Provider::Factory(Box::new(make)),
                comparator: None,
            },
        }
    }

    /// Runs the system every `ticks` ticks instead of every tick.
    ///
    /// # Panics
    ///
    /// Panics when `ticks` is zero.
    pub fn every(mut self, ticks: u32) -> Self {
        assert!(ticks > 0, "system `{}` cannot run every 0 ticks", self.name);
        self.every = ticks;
        self
    }

    /// Sets the initial enabled state (systems start enabled).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Installs the fractional update of an interval system, fired on the
    /// ticks the cadence skips with `alpha = elapsed / every`.
    ///
    /// # Panics
    ///
    /// Panics when called on an iterating system.
    pub fn with_alpha<F>(mut self, on_alpha: F) -> Self
    where
        F: FnMut(&mut World, f32) + 'static,
    {
        match &mut self.kind {
            SystemDefKind::Interval { on_alpha: slot, .. } => *slot = Some(Box::new(on_alpha)),
            SystemDefKind::Iterating { .. } => {
                panic!("system `{}` iterates a family and has no alpha phase", self.name)
            }
        }
        self
    }

    /// Installs a member ordering for an iterating system. The system
    /// keeps its own stable-sorted view of the family and re-sorts it at
    /// the next iteration boundary after the membership changed; other
    /// consumers of the same family are unaffected.
    ///
    /// # Panics
    ///
    /// Panics when called on an interval system.
    pub fn sorted_by<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&World, Entity, Entity) -> Ordering + 'static,
    {
        match &mut self.kind {
            SystemDefKind::Iterating { comparator: slot, .. } => {
                *slot = Some(Box::new(comparator))
            }
            SystemDefKind::Interval { .. } => {
                panic!("system `{}` has no family to sort", self.name)
            }
        }
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the definition into a pipeline entry: the family spec is
    /// registered (deduplicated) and factory bodies receive the injection
    /// registry.
    pub(crate) fn into_entry(self, world: &mut World) -> SystemEntry {
        let kind = match self.kind {
            SystemDefKind::Interval { on_tick, on_alpha } => SystemKind::Interval {
                on_tick: on_tick.resolve(world.injections()),
                on_alpha,
            },
            SystemDefKind::Iterating {
                spec,
                on_tick_entity,
                comparator,
            } => {
                let family = world.family(&spec);
                SystemKind::Iterating {
                    family,
                    on_tick_entity: on_tick_entity.resolve(world.injections()),
                    sorter: comparator.map(|compare| Sorter {
                        compare,
                        cache: Vec::new(),
                        synced_at: None,
                    }),
                }
            }
        };
        SystemEntry {
            name: self.name,
            enabled: self.enabled,
            every: self.every,
            elapsed: 0,
            kind,
        }
    }
}

/// A system's private sorted view of its family.
///
/// The shared family cache stays in id order; each sorted system keeps
/// its own ordering here and re-sorts only when the family's membership
/// version has moved past the one it last synced at.
pub(crate) struct Sorter {
    pub compare: Box<CompareFn>,
    pub cache: Vec<Entity>,
    pub synced_at: Option<u64>,
}

pub(crate) enum SystemKind {
    Interval {
        on_tick: Box<TickFn>,
        on_alpha: Option<Box<AlphaFn>>,
    },
    Iterating {
        family: FamilyHandle,
        on_tick_entity: Box<EntityTickFn>,
        sorter: Option<Sorter>,
    },
}

pub(crate) struct SystemEntry {
    pub name: String,
    pub enabled: bool,
    pub every: u32,
    pub elapsed: u32,
    pub kind: SystemKind,
}

/// The ordered pipeline plus enable/disable toggles awaiting the next
/// tick boundary.
#[derive(Default)]
pub(crate) struct Systems {
    pub entries: Vec<SystemEntry>,
    pending: Vec<(String, bool)>,
}

impl Systems {
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Queues a toggle; applied at the next tick boundary.
    pub fn toggle(&mut self, name: &str, enabled: bool) {
        self.pending.push((name.to_owned(), enabled));
    }

    pub fn apply_toggles(&mut self) {
        for (name, enabled) in self.pending.drain(..) {
            match self.entries.iter_mut().find(|e| e.name == name) {
                Some(entry) => entry.enabled = enabled,
                None => warn!("cannot toggle unknown system `{}`", name),
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }
}
