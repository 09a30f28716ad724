use std::any::{Any, TypeId};

use ahash::AHashMap;

use crate::bitset::BitArray;
use crate::storage::{AnyMapper, ComponentHooks, ComponentMapper};
use crate::world::Entity;

/// Abstract component type.
///
/// A component is a typed datum attached to at most one entity per type.
/// Implement this marker for every type you register with the world;
/// registration happens at world construction and assigns each type a
/// dense id in registration order.
///
/// ```
/// use kith::Component;
///
/// pub struct Position {
///     pub x: f32,
///     pub y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: Any + Sized {}

/// Registry of component types: dense id assignment, type names, the
/// typed mappers, and the per-entity composition masks.
#[derive(Default)]
pub(crate) struct Components {
    ids: AHashMap<TypeId, usize>,
    names: Vec<&'static str>,
    mappers: Vec<Box<dyn AnyMapper>>,
    /// `compositions[e]` holds the set of component type ids entity `e`
    /// currently carries. Grown on entity allocation, cleared on reuse.
    compositions: Vec<BitArray>,
}

impl Components {
    /// Registers `T`, assigning it the next dense type id.
    ///
    /// # Panics
    ///
    /// Panics when `T` is already registered.
    pub fn register<T: Component>(&mut self, hooks: ComponentHooks) {
        let type_id = TypeId::of::<T>();
        let name = std::any::type_name::<T>();
        if self.ids.contains_key(&type_id) {
            panic!("component type `{}` is registered twice", name);
        }
        self.ids.insert(type_id, self.mappers.len());
        self.names.push(name);
        self.mappers.push(Box::new(ComponentMapper::<T>::new(hooks)));
    }

    /// The dense id of `T`.
    ///
    /// # Panics
    ///
    /// Panics when `T` was never registered with this world.
    pub fn id_of<T: Component>(&self) -> usize {
        self.id_of_raw(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub fn id_of_raw(&self, type_id: TypeId, name: &'static str) -> usize {
        match self.ids.get(&type_id) {
            Some(&id) => id,
            None => panic!("component type `{}` was never registered with this world", name),
        }
    }

    pub fn type_count(&self) -> usize {
        self.mappers.len()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn any(&self, id: usize) -> &dyn AnyMapper {
        &*self.mappers[id]
    }

    pub fn any_mut(&mut self, id: usize) -> &mut dyn AnyMapper {
        &mut *self.mappers[id]
    }

    pub fn mapper<T: Component>(&self) -> &ComponentMapper<T> {
        let id = self.id_of::<T>();
        self.mappers[id]
            .as_any()
            .downcast_ref()
            .expect("type id points at a mapper of another type")
    }

    pub fn mapper_mut<T: Component>(&mut self) -> &mut ComponentMapper<T> {
        let id = self.id_of::<T>();
        self.mappers[id]
            .as_any_mut()
            .downcast_mut()
            .expect("type id points at a mapper of another type")
    }

    /// The composition mask of `entity`. The mask exists for every id the
    /// allocator has handed out.
    pub fn composition(&self, entity: Entity) -> &BitArray {
        &self.compositions[entity.id() as usize]
    }

    pub fn composition_mut(&mut self, entity: Entity) -> &mut BitArray {
        &mut self.compositions[entity.id() as usize]
    }

    /// Grows the composition table to cover `entity` and returns its
    /// (cleared-on-reuse) mask.
    pub fn ensure_composition(&mut self, entity: Entity) -> &mut BitArray {
        let id = entity.id() as usize;
        if id >= self.compositions.len() {
            self.compositions.resize_with(id + 1, BitArray::new);
        }
        &mut self.compositions[id]
    }

    /// Drops all stored values and compositions. Fires nothing.
    pub fn clear_all(&mut self) {
        for mapper in &mut self.mappers {
            mapper.clear();
        }
        for comp in &mut self.compositions {
            comp.clear_all();
        }
    }
}
