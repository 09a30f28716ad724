use std::any::{Any, TypeId};

use ahash::AHashMap;
use log::debug;

use crate::storage::ComponentHooks;
use crate::system::{SystemDef, SystemEntry};
use crate::world::comp::{Component, Components};
use crate::world::family::FamilySpec;
use crate::world::World;

/// Named values made available to system factories and, after
/// construction, through [`World::injected`].
#[derive(Default)]
pub struct Injections {
    values: AHashMap<String, Box<dyn Any>>,
}

impl Injections {
    /// The value registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics when nothing was injected under `name` or the value is of a
    /// different type.
    pub fn get<T: 'static>(&self, name: &str) -> &T {
        match self.try_get(name) {
            Some(value) => value,
            None => panic!(
                "nothing of type `{}` was injected under `{}`",
                std::any::type_name::<T>(),
                name
            ),
        }
    }

    /// The value registered under `name`, or `None` when absent or of a
    /// different type.
    pub fn try_get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name)?.downcast_ref()
    }

    fn insert<T: 'static>(&mut self, name: String, value: T) {
        if self.values.insert(name.clone(), Box::new(value)).is_some() {
            panic!("a value is injected twice under `{}`", name);
        }
    }
}

struct ComponentDef {
    type_id: TypeId,
    name: &'static str,
    install: Box<dyn FnOnce(&mut Components)>,
}

/// The declarative world configuration: component types with their
/// lifecycle hooks, named family specs, the ordered system pipeline, and
/// injected dependencies.
///
/// All configuration mistakes (duplicate registrations, unknown component
/// types in family specs, overlapping family sets) are fatal in
/// [`build`](WorldBuilder::build).
///
/// ```
/// use kith::{FamilySpec, SystemDef, WorldBuilder};
///
/// struct Pos(f32);
/// struct Vel(f32);
/// impl kith::Component for Pos {}
/// impl kith::Component for Vel {}
///
/// let mut world = WorldBuilder::new()
///     .register::<Pos>()
///     .register::<Vel>()
///     .system(SystemDef::iterating(
///         "movement",
///         FamilySpec::new().all_of::<Pos>().all_of::<Vel>(),
///         |world, entity, dt| {
///             let step = world.get::<Vel>(entity).0 * dt;
///             world.get_mut::<Pos>(entity).0 += step;
///         },
///     ))
///     .build();
///
/// let e = world.create(|entity| {
///     entity.add(Pos(0.0)).add(Vel(2.0));
/// });
/// world.update(0.5);
/// assert_eq!(world.get::<Pos>(e).0, 1.0);
/// ```
#[derive(Default)]
pub struct WorldBuilder {
    components: Vec<ComponentDef>,
    families: Vec<(String, FamilySpec)>,
    systems: Vec<SystemDef>,
    injections: Injections,
}

impl WorldBuilder {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the component type `T` without lifecycle hooks.
    pub fn register<T: Component>(self) -> Self {
        self.register_with_hooks::<T>(ComponentHooks::new())
    }

    /// Registers `T` together with its `on_add` / `on_remove` hooks.
    pub fn register_with_hooks<T: Component>(mut self, hooks: ComponentHooks) -> Self {
        self.components.push(ComponentDef {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            install: Box::new(move |components| components.register::<T>(hooks)),
        });
        self
    }

    /// Registers a named family. Two names may resolve to the same family
    /// when their specs are equal; two registrations of the same *name*
    /// are fatal.
    pub fn family(mut self, name: impl Into<String>, spec: FamilySpec) -> Self {
        self.families.push((name.into(), spec));
        self
    }

    /// Appends a system to the pipeline; systems run in the order they
    /// were added.
    pub fn system(mut self, def: SystemDef) -> Self {
        self.systems.push(def);
        self
    }

    /// Injects a named value for system factories and runtime lookup.
    ///
    /// # Panics
    ///
    /// Panics when `name` is already taken.
    pub fn inject<T: 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.injections.insert(name.into(), value);
        self
    }

    /// Builds the world: assigns component ids in registration order,
    /// registers families, then instantiates systems with their
    /// dependencies resolved.
    ///
    /// # Panics
    ///
    /// Panics on any duplicate component/family-name/system registration,
    /// unknown component types in family specs, or overlapping family
    /// sets.
    pub fn build(self) -> World {
        let mut components = Components::default();
        let mut seen = AHashMap::new();
        for def in self.components {
            if let Some(prior) = seen.insert(def.type_id, def.name) {
                panic!("component type `{}` is registered twice", prior);
            }
            (def.install)(&mut components);
        }

        let mut world = World::from_parts(components, self.injections);

        for (name, spec) in self.families {
            world.register_named_family(name, &spec);
        }

        let mut entries: Vec<SystemEntry> = Vec::with_capacity(self.systems.len());
        for def in self.systems {
            if entries.iter().any(|e| e.name == def.name()) {
                panic!("system `{}` is registered twice", def.name());
            }
            entries.push(def.into_entry(&mut world));
        }
        world.install_systems(entries);

        debug!(
            "world built: {} component types, {} families, {} systems",
            world.component_names().len(),
            world.family_count(),
            world.system_count(),
        );
        world
    }
}
