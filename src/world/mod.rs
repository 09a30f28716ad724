//! Entities, component registration, families, and general world
//! management.

pub use self::{
    builder::{Injections, WorldBuilder},
    comp::Component,
    entity::{Entities, Entity, EntityEvent, Index},
    family::{FamilyHandle, FamilyListener, FamilySpec},
};

use std::any::Any;
use std::mem;
use std::rc::Rc;

use crossbeam_queue::SegQueue;
use log::{trace, warn};
use shrev::ReaderId;

use crate::bitset::BitArray;
use crate::error::{MissingComponent, NoSuchEntity};
use crate::storage::ComponentMapper;
use crate::system::{Sorter, SystemEntry, SystemKind, Systems};

use self::comp::Components;
use self::family::{Families, Family};

pub(crate) mod builder;
pub(crate) mod comp;
mod entity;
pub(crate) mod family;
#[cfg(test)]
mod tests;

/// A structural mutation captured while a family iteration is live,
/// applied in enqueue order once the outermost iteration exits.
enum DeferredOp {
    DestroyEntity(Entity),
    AddComponent(Entity, usize, Box<dyn Any>),
    RemoveComponent(Entity, usize),
}

/// The top-level container: entity allocator, component mappers, family
/// registry, system pipeline, injection registry and the deferred-op
/// queue. All mutation funnels through this type.
///
/// A world is built from a [`WorldBuilder`] and is single-threaded: it is
/// owned by one execution context, systems run sequentially, and no
/// method suspends.
pub struct World {
    entities: Entities,
    components: Components,
    families: Families,
    systems: Systems,
    injections: Injections,
    deferred: SegQueue<DeferredOp>,
    /// Depth of live family iterations; structural mutation defers while
    /// this is nonzero.
    iterating: u32,
    tick: u64,
    disposed: bool,
}

impl World {
    pub(crate) fn from_parts(components: Components, injections: Injections) -> World {
        World {
            entities: Entities::default(),
            components,
            families: Families::default(),
            systems: Systems::default(),
            injections,
            deferred: SegQueue::new(),
            iterating: 0,
            tick: 0,
            disposed: false,
        }
    }

    pub(crate) fn install_systems(&mut self, entries: Vec<SystemEntry>) {
        self.systems.entries = entries;
    }

    pub(crate) fn injections(&self) -> &Injections {
        &self.injections
    }

    fn assert_live(&self) {
        if self.disposed {
            panic!("world used after dispose");
        }
    }

    // ---- entity lifecycle ----------------------------------------------

    /// Creates an entity and runs `init` with its edit facade to add the
    /// initial components. Component `on_add` hooks fire as the values are
    /// added; families are notified once, after `init` returns; the
    /// `Created` event is published last.
    ///
    /// Creation applies immediately even while a family iteration is
    /// live: a fresh id cannot appear in any live snapshot.
    pub fn create<F>(&mut self, init: F) -> Entity
    where
        F: FnOnce(&mut EntityEdit),
    {
        self.assert_live();
        let entity = self.entities.allocate();
        self.components.ensure_composition(entity).clear_all();
        let mut edit = EntityEdit {
            world: &mut *self,
            entity,
            creating: true,
        };
        init(&mut edit);
        self.refresh_all_families(entity);
        self.entities
            .channel_mut()
            .single_write(EntityEvent::Created(entity));
        entity
    }

    /// Destroys an entity. Outside iteration the destruction applies
    /// immediately: `on_remove` hooks fire per carried component, mapper
    /// masks and families update, then the id is recycled. During
    /// iteration the destruction is queued and the entity stays visible
    /// to the current snapshot; a second `remove` of the same entity
    /// while queued is accepted without enqueueing a duplicate.
    pub fn remove(&mut self, entity: Entity) -> Result<(), NoSuchEntity> {
        self.assert_live();
        if !self.entities.is_alive(entity) {
            return Err(NoSuchEntity {
                action: "remove",
                entity,
            });
        }
        if self.iterating > 0 {
            if self.entities.defer_removal(entity) {
                trace!("deferring destruction of {:?}", entity);
                self.deferred.push(DeferredOp::DestroyEntity(entity));
            }
            return Ok(());
        }
        self.destroy_now(entity);
        Ok(())
    }

    /// Returns the edit facade for an entity, scoping component access to
    /// it.
    pub fn edit(&mut self, entity: Entity) -> EntityEdit<'_> {
        self.assert_live();
        EntityEdit {
            world: self,
            entity,
            creating: false,
        }
    }

    /// `true` while the entity is alive. An entity whose destruction is
    /// queued but not yet applied is still alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// The number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.count()
    }

    /// The entity service.
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// The bitset of live entity ids; one leg of the state triple an
    /// external snapshot layer consumes.
    pub fn alive_mask(&self) -> &BitArray {
        self.entities.alive_mask()
    }

    // ---- components ----------------------------------------------------

    /// Adds (or replaces) a component on an entity. On replacement the
    /// prior value's `on_remove` hook fires first, then the value is
    /// written and `on_add` fires, then families referencing the type are
    /// notified. During iteration the whole operation is deferred.
    ///
    /// Adding to a dead entity logs a warning and does nothing.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) {
        self.assert_live();
        let type_id = self.components.id_of::<T>();
        if !self.entities.is_alive(entity) {
            warn!(
                "insert of `{}` failed because {:?} is dead",
                std::any::type_name::<T>(),
                entity
            );
            return;
        }
        if self.iterating > 0 {
            trace!("deferring component add for {:?}", entity);
            self.deferred
                .push(DeferredOp::AddComponent(entity, type_id, Box::new(value)));
            return;
        }
        self.apply_insert(entity, type_id, Box::new(value), true);
    }

    /// Removes a component from an entity; a no-op when the entity does
    /// not carry one. The `on_remove` hook fires while the value is still
    /// stored. During iteration the operation is deferred.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.assert_live();
        let type_id = self.components.id_of::<T>();
        if !self.entities.is_alive(entity) {
            warn!(
                "removal of `{}` failed because {:?} is dead",
                std::any::type_name::<T>(),
                entity
            );
            return;
        }
        if self.iterating > 0 {
            trace!("deferring component removal for {:?}", entity);
            self.deferred
                .push(DeferredOp::RemoveComponent(entity, type_id));
            return;
        }
        self.apply_remove(entity, type_id, true);
    }

    /// The component value of type `T` on `entity`.
    ///
    /// # Panics
    ///
    /// Panics when the entity does not carry the component, or `T` was
    /// never registered.
    pub fn get<T: Component>(&self, entity: Entity) -> &T {
        self.mapper::<T>().get(entity)
    }

    /// The component value, or `None` when absent.
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.mapper::<T>().try_get(entity)
    }

    /// Mutable access to the component value of type `T` on `entity`.
    ///
    /// # Panics
    ///
    /// Panics when the entity does not carry the component, or `T` was
    /// never registered.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        self.assert_live();
        match self.components.mapper_mut::<T>().try_get_mut(entity) {
            Some(value) => value,
            None => panic!(
                "{}",
                MissingComponent {
                    entity,
                    type_name: std::any::type_name::<T>(),
                }
            ),
        }
    }

    /// Mutable access to the component value, or `None` when absent.
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.assert_live();
        self.components.mapper_mut::<T>().try_get_mut(entity)
    }

    /// `true` when the entity carries a `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.mapper::<T>().has(entity)
    }

    /// The mapper of `T`, for reads and bulk iteration.
    ///
    /// # Panics
    ///
    /// Panics when `T` was never registered.
    pub fn mapper<T: Component>(&self) -> &ComponentMapper<T> {
        self.assert_live();
        self.components.mapper::<T>()
    }

    /// The registered component type names, indexed by type id; one leg
    /// of the state triple an external snapshot layer consumes.
    pub fn component_names(&self) -> &[&'static str] {
        self.components.names()
    }

    // ---- families ------------------------------------------------------

    /// Returns the family for `spec`, creating it if no family with an
    /// equal spec exists yet. A family created after entities already
    /// exist seeds its membership by scanning the live entities.
    ///
    /// # Panics
    ///
    /// Panics when the spec names an unregistered component type or its
    /// sets overlap.
    pub fn family(&mut self, spec: &FamilySpec) -> FamilyHandle {
        self.assert_live();
        let resolved = spec.resolve(&self.components);
        if let Some(&idx) = self.families.by_key.get(&resolved.key) {
            return FamilyHandle(idx);
        }
        let idx = self.families.list.len();
        let mut family = Family::new(&resolved);
        {
            let components = &self.components;
            self.entities.alive_mask().for_each_set_bit(|id| {
                let entity = Entity::from_id(id);
                if family.matches(components.composition(entity)) {
                    family.active.set(id);
                }
            });
        }
        for &type_id in &resolved.touched {
            self.components.any_mut(type_id).push_family(idx);
        }
        self.families.by_key.insert(resolved.key, idx);
        self.families.list.push(family);
        FamilyHandle(idx)
    }

    pub(crate) fn register_named_family(&mut self, name: String, spec: &FamilySpec) {
        if self.families.by_name.contains_key(&name) {
            panic!("family name `{}` is registered twice", name);
        }
        let handle = self.family(spec);
        self.families.by_name.insert(name, handle.0);
    }

    /// The family registered under `name` at build time, if any.
    pub fn family_by_name(&self, name: &str) -> Option<FamilyHandle> {
        self.families.by_name.get(name).map(|&idx| FamilyHandle(idx))
    }

    /// Attaches a membership listener to a family.
    pub fn add_family_listener<L>(&mut self, handle: FamilyHandle, listener: L)
    where
        L: FamilyListener + 'static,
    {
        self.assert_live();
        self.families.list[handle.0].listeners.push(Rc::new(listener));
    }

    /// The number of entities currently matching the family.
    pub fn family_len(&self, handle: FamilyHandle) -> usize {
        self.assert_live();
        self.families.list[handle.0].active.count_set_bits()
    }

    /// `true` when `entity` currently matches the family.
    pub fn family_contains(&self, handle: FamilyHandle, entity: Entity) -> bool {
        self.assert_live();
        self.families.list[handle.0].active.get(entity.id())
    }

    /// The current members of the family, in descending id order.
    pub fn family_members(&self, handle: FamilyHandle) -> Vec<Entity> {
        let mut members = Vec::new();
        self.families.list[handle.0]
            .active
            .for_each_set_bit(|id| members.push(Entity::from_id(id)));
        members
    }

    /// Iterates a snapshot of the family's members, taken at entry.
    ///
    /// While the iteration is live, structural mutation through the world
    /// defers; when the outermost iteration exits, the deferred queue is
    /// drained. Entities destroyed from inside the loop therefore stay
    /// visible until the loop ends; entities that start matching become
    /// visible at the next iteration.
    pub fn for_each<F>(&mut self, handle: FamilyHandle, mut action: F)
    where
        F: FnMut(&mut World, Entity),
    {
        self.assert_live();
        let snapshot = self.family_snapshot(handle);
        self.iterating += 1;
        for &entity in &snapshot {
            action(self, entity);
        }
        self.iterating -= 1;
        if self.iterating == 0 {
            self.drain_deferred();
        }
    }

    pub(crate) fn family_count(&self) -> usize {
        self.families.list.len()
    }

    /// Rebuilds the family's ordered cache if it is dirty and returns a
    /// snapshot of it, in descending id order.
    pub(crate) fn family_snapshot(&mut self, handle: FamilyHandle) -> Vec<Entity> {
        let family = &mut self.families.list[handle.0];
        if family.dirty {
            family.rebuild_cache();
        }
        family.cache.clone()
    }

    /// Returns a snapshot ordered by the system's comparator. The shared
    /// family cache is left in id order; the sorted view lives on the
    /// sorter and is recomputed only when the family's membership version
    /// has moved since the sorter last synced.
    pub(crate) fn family_snapshot_sorted(
        &mut self,
        handle: FamilyHandle,
        sorter: &mut Sorter,
    ) -> Vec<Entity> {
        let version = {
            let family = &mut self.families.list[handle.0];
            if family.dirty {
                family.rebuild_cache();
            }
            family.version
        };
        if sorter.synced_at != Some(version) {
            let mut cache = self.families.list[handle.0].cache.clone();
            let compare = &sorter.compare;
            cache.sort_by(|a, b| compare(self, *a, *b));
            sorter.cache = cache;
            sorter.synced_at = Some(version);
        }
        sorter.cache.clone()
    }

    // ---- systems and ticking -------------------------------------------

    /// Runs one tick: each enabled system in pipeline order, with the
    /// deferred queue drained between systems and once more at the end,
    /// so every system observes the effects of all earlier systems plus
    /// all drained operations. The queue is empty when this returns.
    pub fn update(&mut self, delta: f32) {
        self.assert_live();
        self.tick += 1;
        self.systems.apply_toggles();
        let mut entries = mem::take(&mut self.systems.entries);
        for entry in &mut entries {
            if !entry.enabled {
                continue;
            }
            entry.elapsed += 1;
            if entry.elapsed < entry.every {
                if let SystemKind::Interval {
                    on_alpha: Some(on_alpha),
                    ..
                } = &mut entry.kind
                {
                    on_alpha(self, entry.elapsed as f32 / entry.every as f32);
                }
                continue;
            }
            entry.elapsed = 0;
            match &mut entry.kind {
                SystemKind::Interval { on_tick, .. } => on_tick(self, delta),
                SystemKind::Iterating {
                    family,
                    on_tick_entity,
                    sorter,
                } => {
                    let snapshot = match sorter {
                        Some(sorter) => self.family_snapshot_sorted(*family, sorter),
                        None => self.family_snapshot(*family),
                    };
                    self.iterating += 1;
                    for &entity in &snapshot {
                        on_tick_entity(self, entity, delta);
                    }
                    self.iterating -= 1;
                }
            }
            self.drain_deferred();
        }
        self.drain_deferred();
        debug_assert!(self.deferred.is_empty());
        self.systems.entries = entries;
    }

    /// The number of completed [`update`](World::update) calls.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Queues an enable/disable toggle for the named system; it takes
    /// effect at the next tick boundary. Unknown names log a warning when
    /// the toggle is applied.
    pub fn enable_system(&mut self, name: &str, enabled: bool) {
        self.assert_live();
        self.systems.toggle(name, enabled);
    }

    /// `true` when a system with this name is part of the pipeline.
    pub fn has_system(&self, name: &str) -> bool {
        self.systems.contains(name)
    }

    pub(crate) fn system_count(&self) -> usize {
        self.systems.entries.len()
    }

    // ---- injections ----------------------------------------------------

    /// The injected value registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics when nothing of type `T` is injected under `name`.
    pub fn injected<T: 'static>(&self, name: &str) -> &T {
        self.injections.get(name)
    }

    /// The injected value registered under `name`, if any.
    pub fn try_injected<T: 'static>(&self, name: &str) -> Option<&T> {
        self.injections.try_get(name)
    }

    // ---- entity events -------------------------------------------------

    /// Registers a reader for the entity lifecycle event channel.
    pub fn register_entity_reader(&mut self) -> ReaderId<EntityEvent> {
        self.entities.channel_mut().register_reader()
    }

    /// Reads the entity lifecycle events published since the reader last
    /// read.
    pub fn entity_events<'a>(
        &'a self,
        reader: &'a mut ReaderId<EntityEvent>,
    ) -> impl Iterator<Item = &'a EntityEvent> + 'a {
        self.entities.channel().read(reader)
    }

    // ---- teardown ------------------------------------------------------

    /// Clears all state: entities, component values, family memberships,
    /// systems and queued operations. Fires no hooks and publishes no
    /// events. Every subsequent call on this world panics.
    pub fn dispose(&mut self) {
        self.assert_live();
        self.disposed = true;
        while self.deferred.pop().is_some() {}
        self.components.clear_all();
        self.families.clear();
        self.systems.clear();
        self.entities.reset();
    }

    // ---- mutation plumbing ---------------------------------------------

    /// The shared add/replace path. `notify` is false only while an
    /// entity is being created, where families are notified once at the
    /// end instead of per component.
    pub(crate) fn apply_insert(
        &mut self,
        entity: Entity,
        type_id: usize,
        value: Box<dyn Any>,
        notify: bool,
    ) {
        let hooks = self.components.any(type_id).hooks().clone();
        let replacing = self.components.any(type_id).mask().get(entity.id());
        if replacing {
            if let Some(on_remove) = &hooks.on_remove {
                on_remove(self, entity);
            }
        }
        self.components.any_mut(type_id).insert_boxed(entity, value);
        self.components.composition_mut(entity).set(type_id as u32);
        if let Some(on_add) = &hooks.on_add {
            on_add(self, entity);
        }
        if notify {
            self.refresh_families_for_type(entity, type_id);
        }
    }

    /// The shared removal path; absent components are a no-op.
    pub(crate) fn apply_remove(&mut self, entity: Entity, type_id: usize, notify: bool) {
        if !self.components.any(type_id).mask().get(entity.id()) {
            return;
        }
        let hooks = self.components.any(type_id).hooks().clone();
        if let Some(on_remove) = &hooks.on_remove {
            on_remove(self, entity);
        }
        self.components.any_mut(type_id).discard_if_present(entity);
        self.components.composition_mut(entity).clear(type_id as u32);
        if notify {
            self.refresh_families_for_type(entity, type_id);
        }
    }

    fn destroy_now(&mut self, entity: Entity) {
        for type_id in 0..self.components.type_count() {
            if self.components.any(type_id).mask().get(entity.id()) {
                let on_remove = self.components.any(type_id).hooks().on_remove.clone();
                if let Some(hook) = on_remove {
                    hook(self, entity);
                }
                self.components.any_mut(type_id).discard_if_present(entity);
            }
        }
        self.components.composition_mut(entity).clear_all();
        self.refresh_all_families(entity);
        self.entities.free(entity);
        self.entities
            .channel_mut()
            .single_write(EntityEvent::Removed(entity));
    }

    fn drain_deferred(&mut self) {
        while let Some(op) = self.deferred.pop() {
            match op {
                DeferredOp::DestroyEntity(entity) => {
                    if self.entities.is_alive(entity) {
                        self.destroy_now(entity);
                    } else {
                        warn!("deferred destruction skipped, {:?} is already dead", entity);
                    }
                }
                DeferredOp::AddComponent(entity, type_id, value) => {
                    if self.entities.is_alive(entity) {
                        self.apply_insert(entity, type_id, value, true);
                    } else {
                        warn!("deferred component add skipped, {:?} is dead", entity);
                    }
                }
                DeferredOp::RemoveComponent(entity, type_id) => {
                    if self.entities.is_alive(entity) {
                        self.apply_remove(entity, type_id, true);
                    } else {
                        warn!("deferred component removal skipped, {:?} is dead", entity);
                    }
                }
            }
        }
    }

    /// Re-evaluates the families whose specs reference `type_id` for
    /// `entity`; the list was precomputed at family registration.
    fn refresh_families_for_type(&mut self, entity: Entity, type_id: usize) {
        let touched = self.components.any(type_id).families().to_vec();
        self.refresh_families(entity, &touched);
    }

    /// Re-evaluates every family for `entity`. Used on entity creation
    /// and destruction: an entity with an empty composition can still
    /// match a pure `none_of` family.
    fn refresh_all_families(&mut self, entity: Entity) {
        let all: Vec<usize> = (0..self.families.list.len()).collect();
        self.refresh_families(entity, &all);
    }

    fn refresh_families(&mut self, entity: Entity, families: &[usize]) {
        let mut flips: Vec<(usize, bool)> = Vec::new();
        {
            let comps = self.components.composition(entity);
            for &idx in families {
                if let Some(added) = self.families.list[idx].apply(entity, comps) {
                    flips.push((idx, added));
                }
            }
        }
        for (idx, added) in flips {
            let listeners = self.families.list[idx].listeners.clone();
            for listener in listeners {
                if added {
                    listener.on_entity_added(self, entity);
                } else {
                    listener.on_entity_removed(self, entity);
                }
            }
        }
    }
}

/// Scoped component access for one entity, returned by [`World::create`]
/// and [`World::edit`].
///
/// During creation, adds apply immediately and family notification is
/// batched to the end of `create`. From `edit`, operations follow the
/// world's usual rules, including deferral during iteration.
pub struct EntityEdit<'a> {
    world: &'a mut World,
    entity: Entity,
    creating: bool,
}

impl EntityEdit<'_> {
    /// The entity this facade is scoped to.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Adds (or replaces) a component on the entity.
    pub fn add<T: Component>(&mut self, value: T) -> &mut Self {
        if self.creating {
            let type_id = self.world.components.id_of::<T>();
            self.world
                .apply_insert(self.entity, type_id, Box::new(value), false);
        } else {
            self.world.insert(self.entity, value);
        }
        self
    }

    /// Removes a component from the entity; a no-op when absent.
    pub fn remove<T: Component>(&mut self) -> &mut Self {
        if self.creating {
            let type_id = self.world.components.id_of::<T>();
            self.world.apply_remove(self.entity, type_id, false);
        } else {
            self.world.remove_component::<T>(self.entity);
        }
        self
    }

    /// The entity's component of type `T`.
    ///
    /// # Panics
    ///
    /// Panics when the entity does not carry the component.
    pub fn get<T: Component>(&self) -> &T {
        self.world.mapper::<T>().get(self.entity)
    }

    /// The entity's component, or `None` when absent.
    pub fn try_get<T: Component>(&self) -> Option<&T> {
        self.world.mapper::<T>().try_get(self.entity)
    }

    /// Mutable access to the entity's component of type `T`.
    ///
    /// # Panics
    ///
    /// Panics when the entity does not carry the component.
    pub fn get_mut<T: Component>(&mut self) -> &mut T {
        self.world.get_mut::<T>(self.entity)
    }

    /// `true` when the entity carries a `T`.
    pub fn has<T: Component>(&self) -> bool {
        self.world.mapper::<T>().has(self.entity)
    }

    /// The world this facade borrows.
    pub fn world(&mut self) -> &mut World {
        self.world
    }
}
