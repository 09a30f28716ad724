use std::any::TypeId;
use std::rc::Rc;

use ahash::AHashMap;

use crate::bitset::BitArray;
use crate::world::comp::{Component, Components};
use crate::world::{Entity, World};

/// A family specification: which component types an entity must carry
/// (`all_of`), may carry at least one of (`any_of`), and must not carry
/// (`none_of`).
///
/// Specs are built over types and resolved against the world's registry
/// when the family is created. Two specs naming the same three sets are
/// the same family; the world deduplicates.
///
/// ```
/// use kith::FamilySpec;
///
/// struct Pos;
/// struct Vel;
/// struct Frozen;
/// impl kith::Component for Pos {}
/// impl kith::Component for Vel {}
/// impl kith::Component for Frozen {}
///
/// let movers = FamilySpec::new()
///     .all_of::<Pos>()
///     .all_of::<Vel>()
///     .none_of::<Frozen>();
/// # drop(movers);
/// ```
#[derive(Clone, Default)]
pub struct FamilySpec {
    all: Vec<(TypeId, &'static str)>,
    any: Vec<(TypeId, &'static str)>,
    none: Vec<(TypeId, &'static str)>,
}

impl FamilySpec {
    /// An empty spec. An empty spec matches every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires members to carry `T`.
    pub fn all_of<T: Component>(mut self) -> Self {
        self.all.push((TypeId::of::<T>(), std::any::type_name::<T>()));
        self
    }

    /// Requires members to carry at least one of the `any_of` types.
    pub fn any_of<T: Component>(mut self) -> Self {
        self.any.push((TypeId::of::<T>(), std::any::type_name::<T>()));
        self
    }

    /// Excludes entities carrying `T`.
    pub fn none_of<T: Component>(mut self) -> Self {
        self.none.push((TypeId::of::<T>(), std::any::type_name::<T>()));
        self
    }

    /// Resolves the type tokens against the registry.
    ///
    /// # Panics
    ///
    /// Panics when a named type was never registered, or when the three
    /// sets overlap.
    pub(crate) fn resolve(&self, components: &Components) -> ResolvedSpec {
        let ids = |set: &[(TypeId, &'static str)]| -> Vec<u32> {
            let mut ids: Vec<u32> = set
                .iter()
                .map(|&(tid, name)| components.id_of_raw(tid, name) as u32)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let key = FamilyKey {
            all: ids(&self.all),
            any: ids(&self.any),
            none: ids(&self.none),
        };

        let sets = [(&key.all, &key.any), (&key.all, &key.none), (&key.any, &key.none)];
        for (a, b) in sets {
            if a.iter().any(|id| b.contains(id)) {
                panic!("family spec lists the same component type in two of its sets");
            }
        }

        let bits = |ids: &[u32]| {
            let mut b = BitArray::new();
            for &id in ids {
                b.set(id);
            }
            b
        };
        let mut touched: Vec<usize> = key
            .all
            .iter()
            .chain(key.any.iter())
            .chain(key.none.iter())
            .map(|&id| id as usize)
            .collect();
        touched.sort_unstable();

        ResolvedSpec {
            all_of: bits(&key.all),
            any_of: bits(&key.any),
            none_of: bits(&key.none),
            touched,
            key,
        }
    }
}

/// Canonical dedup key of a family: the three sorted id sets.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct FamilyKey {
    all: Vec<u32>,
    any: Vec<u32>,
    none: Vec<u32>,
}

pub(crate) struct ResolvedSpec {
    pub all_of: BitArray,
    pub any_of: BitArray,
    pub none_of: BitArray,
    /// Type ids whose mappers must notify this family, deduplicated.
    pub touched: Vec<usize>,
    pub key: FamilyKey,
}

/// A handle to a family registered with a world.
///
/// Handles are plain indices; they are only meaningful against the world
/// that issued them and stay valid for the world's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FamilyHandle(pub(crate) usize);

/// Observes membership changes of one family.
///
/// Listeners fire right after the membership bit flips, outside any
/// storage borrow, and receive the world mutably; reentrant mutation from
/// a listener follows the usual deferral rules. Listeners must not retain
/// iteration snapshots beyond the call.
pub trait FamilyListener {
    /// The entity started matching the family.
    fn on_entity_added(&self, world: &mut World, entity: Entity);
    /// The entity stopped matching the family.
    fn on_entity_removed(&self, world: &mut World, entity: Entity);
}

/// One registered family: the resolved spec, the member bitset, and the
/// lazily rebuilt ordered member cache.
pub(crate) struct Family {
    all_of: BitArray,
    any_of: BitArray,
    none_of: BitArray,
    pub active: BitArray,
    pub cache: Vec<Entity>,
    pub dirty: bool,
    /// Bumped on every membership flip; sorted consumers compare it
    /// against the version they last sorted at.
    pub version: u64,
    pub listeners: Vec<Rc<dyn FamilyListener>>,
}

impl Family {
    pub fn new(spec: &ResolvedSpec) -> Self {
        Family {
            all_of: spec.all_of.clone(),
            any_of: spec.any_of.clone(),
            none_of: spec.none_of.clone(),
            active: BitArray::new(),
            cache: Vec::new(),
            dirty: true,
            version: 0,
            listeners: Vec::new(),
        }
    }

    /// The match predicate over an entity's composition mask.
    pub fn matches(&self, comps: &BitArray) -> bool {
        (self.all_of.is_empty() || comps.contains_all(&self.all_of))
            && (self.any_of.is_empty() || comps.intersects(&self.any_of))
            && (self.none_of.is_empty() || !comps.intersects(&self.none_of))
    }

    /// Re-evaluates the predicate for `entity`. On a membership flip the
    /// active bit and dirty flag update; returns whether the entity was
    /// added (`Some(true)`), removed (`Some(false)`), or unchanged.
    pub fn apply(&mut self, entity: Entity, comps: &BitArray) -> Option<bool> {
        let matched = self.matches(comps);
        if matched == self.active.get(entity.id()) {
            return None;
        }
        if matched {
            self.active.set(entity.id());
        } else {
            self.active.clear(entity.id());
        }
        self.dirty = true;
        self.version += 1;
        Some(matched)
    }

    /// Rebuilds the ordered cache from the member bitset (descending id
    /// order, the bit-iteration order) and clears the dirty flag.
    pub fn rebuild_cache(&mut self) {
        self.cache.clear();
        let cache = &mut self.cache;
        self.active.for_each_set_bit(|id| cache.push(Entity::from_id(id)));
        self.dirty = false;
    }
}

/// All families of a world plus the dedup and name indices.
#[derive(Default)]
pub(crate) struct Families {
    pub list: Vec<Family>,
    pub by_key: AHashMap<FamilyKey, usize>,
    pub by_name: AHashMap<String, usize>,
}

impl Families {
    pub fn clear(&mut self) {
        self.list.clear();
        self.by_key.clear();
        self.by_name.clear();
    }
}
