use shrev::EventChannel;

use crate::bitset::BitArray;

/// An index is basically the id of an `Entity`.
pub type Index = u32;

/// `Entity` type, as seen by the user.
///
/// A stable, opaque, nonnegative id. An entity is valid while the world
/// says it is alive; ids are recycled on destruction, so a stale handle
/// can alias a newer entity. There is no generation counter.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct Entity(Index);

impl Entity {
    /// Creates an entity handle externally from the ECS, for tests that
    /// probe storage paths directly.
    #[cfg(test)]
    pub fn new(id: Index) -> Entity {
        Entity(id)
    }

    pub(crate) fn from_id(id: Index) -> Entity {
        Entity(id)
    }

    /// Returns the id of the `Entity`.
    #[inline]
    pub fn id(&self) -> Index {
        self.0
    }
}

/// An entity lifecycle event, published on the world's event channel.
///
/// `Created` fires once the entity is fully configured (all initial
/// components added, families notified). `Removed` fires after the
/// destruction has been applied and before the id can be reissued.
/// `World::dispose` publishes nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityEvent {
    /// The entity finished creation.
    Created(Entity),
    /// The entity's destruction was applied.
    Removed(Entity),
}

/// Allocates and recycles entity ids and tracks which are alive.
///
/// Ids are handed out monotonically until the first destruction; after
/// that, freed ids are reissued most-recently-freed first.
pub struct Entities {
    next_id: Index,
    recycled: Vec<Index>,
    alive: BitArray,
    /// Ids whose destruction has been requested but not yet applied.
    removed: BitArray,
    channel: EventChannel<EntityEvent>,
}

impl Default for Entities {
    fn default() -> Self {
        Entities {
            next_id: 0,
            recycled: Vec::new(),
            alive: BitArray::new(),
            removed: BitArray::new(),
            channel: EventChannel::new(),
        }
    }
}

impl Entities {
    /// Allocates an id: the most recently recycled one if any, otherwise a
    /// fresh one. The alive bit is set before the id is returned.
    pub(crate) fn allocate(&mut self) -> Entity {
        let id = match self.recycled.pop() {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        self.alive.set(id);
        Entity(id)
    }

    /// Releases an id back to the allocator. The caller has already torn
    /// down all component state for it.
    pub(crate) fn free(&mut self, entity: Entity) {
        self.alive.clear(entity.id());
        self.removed.clear(entity.id());
        self.recycled.push(entity.id());
    }

    /// Marks a destruction as queued; returns `false` when it already was.
    pub(crate) fn defer_removal(&mut self, entity: Entity) -> bool {
        if self.removed.get(entity.id()) {
            return false;
        }
        self.removed.set(entity.id());
        true
    }

    /// `true` while the world considers the entity alive. An entity whose
    /// destruction is queued but unapplied is still alive.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.get(entity.id())
    }

    /// The bitset of currently-live ids.
    pub fn alive_mask(&self) -> &BitArray {
        &self.alive
    }

    /// The number of currently-live entities.
    pub fn count(&self) -> usize {
        self.alive.count_set_bits()
    }

    pub(crate) fn channel_mut(&mut self) -> &mut EventChannel<EntityEvent> {
        &mut self.channel
    }

    pub(crate) fn channel(&self) -> &EventChannel<EntityEvent> {
        &self.channel
    }

    /// Drops every id and all bookkeeping. Publishes no events.
    pub(crate) fn reset(&mut self) {
        self.next_id = 0;
        self.recycled.clear();
        self.alive.clear_all();
        self.removed.clear_all();
    }
}
