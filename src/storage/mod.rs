//! Component storage: one typed mapper per registered component type.

use std::any::Any;
use std::rc::Rc;

use crate::bitset::BitArray;
use crate::error::MissingComponent;
use crate::world::{Component, Entity, World};


/// A lifecycle hook configured for a component type.
///
/// Hooks receive the world and the affected entity; the component value is
/// reachable through the world (add hooks run after the value is stored,
/// remove hooks before it is dropped).
pub type Hook = Rc<dyn Fn(&mut World, Entity)>;

/// The `on_add` / `on_remove` hook pair for one component type.
///
/// ```
/// use kith::{ComponentHooks, WorldBuilder};
///
/// struct Health(u32);
/// impl kith::Component for Health {}
///
/// let world = WorldBuilder::new()
///     .register_with_hooks::<Health>(
///         ComponentHooks::new().on_add(|_world, entity| {
///             log::debug!("{:?} gained health", entity);
///         }),
///     )
///     .build();
/// # drop(world);
/// ```
#[derive(Clone, Default)]
pub struct ComponentHooks {
    pub(crate) on_add: Option<Hook>,
    pub(crate) on_remove: Option<Hook>,
}

impl ComponentHooks {
    /// A hook set with neither hook installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the hook fired after a value of this type is added to an
    /// entity (also after each replacement).
    pub fn on_add<F: Fn(&mut World, Entity) + 'static>(mut self, f: F) -> Self {
        self.on_add = Some(Rc::new(f));
        self
    }

    /// Installs the hook fired before a value of this type is removed from
    /// an entity (also before each replacement, for the prior value).
    pub fn on_remove<F: Fn(&mut World, Entity) + 'static>(mut self, f: F) -> Self {
        self.on_remove = Some(Rc::new(f));
        self
    }
}

/// Dense storage for one component type, indexed by entity id.
///
/// A mapper owns a slot vector and a membership mask in lockstep: the
/// mask has a bit for an entity exactly when its slot holds a value.
/// Storage grows on demand and never shrinks.
///
/// All mutation funnels through the world so that hooks fire and families
/// stay current; the mapper itself only exposes reads plus the internal
/// [`discard`](ComponentMapper::discard) fast path.
pub struct ComponentMapper<T: Component> {
    slots: Vec<Option<T>>,
    mask: BitArray,
    hooks: ComponentHooks,
    /// Indices of the families whose specs reference this component type.
    families: Vec<usize>,
}

impl<T: Component> ComponentMapper<T> {
    pub(crate) fn new(hooks: ComponentHooks) -> Self {
        ComponentMapper {
            slots: Vec::new(),
            mask: BitArray::new(),
            hooks,
            families: Vec::new(),
        }
    }

    /// `true` when the entity carries a value of this type. Out-of-range
    /// ids safely read as `false`.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        self.mask.get(entity.id())
    }

    /// The value for `entity`, or `None` when absent.
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.slots.get(entity.id() as usize)?.as_ref()
    }

    /// The value for `entity`.
    ///
    /// # Panics
    ///
    /// Panics when the entity does not carry this component.
    pub fn get(&self, entity: Entity) -> &T {
        match self.try_get(entity) {
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

    pub(crate) fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slots.get_mut(entity.id() as usize)?.as_mut()
    }

    /// The membership mask of this mapper.
    pub fn mask(&self) -> &BitArray {
        &self.mask
    }

    /// The number of entities carrying this component.
    pub fn count(&self) -> usize {
        self.mask.count_set_bits()
    }

    /// Iterates all `(entity, value)` pairs in ascending entity order.
    ///
    /// Together with the world's alive mask and component names this is
    /// the state an external snapshot layer needs.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|v| (Entity::from_id(id as u32), v)))
    }

    /// Stores `value`, growing storage to cover the id, and returns the
    /// replaced value if one was present.
    pub(crate) fn put(&mut self, entity: Entity, value: T) -> Option<T> {
        let id = entity.id() as usize;
        if id >= self.slots.len() {
            self.slots.resize_with(id + 1, || None);
        }
        let prior = self.slots[id].replace(value);
        self.mask.set(entity.id());
        prior
    }

    /// Drops the stored value for `entity` without firing hooks or
    /// touching families. This is the internal removal fast path used
    /// once the public surface has already validated the operation.
    ///
    /// # Panics
    ///
    /// Panics with an out-of-bounds index when `entity`'s id lies beyond
    /// the storage length.
    pub fn discard(&mut self, entity: Entity) {
        self.slots[entity.id() as usize] = None;
        self.mask.clear(entity.id());
    }
}

/// The type-erased surface of a mapper, for the deferred-op queue and the
/// destruction sweep.
pub(crate) trait AnyMapper {
    fn mask(&self) -> &BitArray;
    /// Stores a boxed value of the mapper's component type, dropping any
    /// prior value. The caller has already fired the remove hook for it.
    fn insert_boxed(&mut self, entity: Entity, value: Box<dyn Any>);
    /// Drops the entity's value if present; no hooks, no family updates.
    fn discard_if_present(&mut self, entity: Entity);
    fn hooks(&self) -> &ComponentHooks;
    fn families(&self) -> &[usize];
    fn push_family(&mut self, family: usize);
    /// Drops every stored value. Fires nothing.
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyMapper for ComponentMapper<T> {
    fn mask(&self) -> &BitArray {
        &self.mask
    }

    fn insert_boxed(&mut self, entity: Entity, value: Box<dyn Any>) {
        let value = value
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("deferred value routed to the wrong mapper"));
        self.put(entity, *value);
    }

    fn discard_if_present(&mut self, entity: Entity) {
        if self.mask.get(entity.id()) {
            self.discard(entity);
        }
    }

    fn hooks(&self) -> &ComponentHooks {
        &self.hooks
    }

    fn families(&self) -> &[usize] {
        &self.families
    }

    fn push_family(&mut self, family: usize) {
        self.families.push(family);
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.mask.clear_all();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
