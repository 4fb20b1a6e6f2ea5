//! Entity Arena
//!
//! Single owner of entity values. The id index is a non-owning lookup into
//! arena slots; vacated slots are recycled but ids never are.

use std::collections::BTreeMap;

use crate::core::entity::{Entity, EntityId};

/// Arena of entities plus an id → slot index.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    slots: Vec<Option<Entity>>,
    index: BTreeMap<EntityId, usize>,
    free: Vec<usize>,
}

impl EntityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity. Returns false (and leaves the store untouched)
    /// when the id is already present.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.index.contains_key(&entity.eid) {
            return false;
        }
        let eid = entity.eid;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entity);
                slot
            }
            None => {
                self.slots.push(Some(entity));
                self.slots.len() - 1
            }
        };
        self.index.insert(eid, slot);
        true
    }

    /// Remove and return an entity.
    pub fn remove(&mut self, eid: EntityId) -> Option<Entity> {
        let slot = self.index.remove(&eid)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    /// Lookup by id.
    pub fn get(&self, eid: EntityId) -> Option<&Entity> {
        let slot = *self.index.get(&eid)?;
        self.slots[slot].as_ref()
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, eid: EntityId) -> Option<&mut Entity> {
        let slot = *self.index.get(&eid)?;
        self.slots[slot].as_mut()
    }

    /// Whether an id is present.
    pub fn contains(&self, eid: EntityId) -> bool {
        self.index.contains_key(&eid)
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.index
            .values()
            .filter_map(move |slot| self.slots[*slot].as_ref())
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Position;

    #[test]
    fn test_insert_get_remove() {
        let mut store = EntityStore::new();
        assert!(store.insert(Entity::new(EntityId(1), "a", "t")));
        assert!(store.insert(Entity::new(EntityId(2), "b", "t")));
        assert_eq!(store.len(), 2);

        store.get_mut(EntityId(2)).unwrap().set_pos(3, 4);
        assert_eq!(store.get(EntityId(2)).unwrap().pos, Position::new(3, 4));

        let removed = store.remove(EntityId(1)).unwrap();
        assert_eq!(removed.name, "a");
        assert!(!store.contains(EntityId(1)));
        assert!(store.remove(EntityId(1)).is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = EntityStore::new();
        store.insert(Entity::new(EntityId(5), "first", "t"));
        assert!(!store.insert(Entity::new(EntityId(5), "second", "t")));
        assert_eq!(store.get(EntityId(5)).unwrap().name, "first");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_slot_reuse_keeps_index_consistent() {
        let mut store = EntityStore::new();
        store.insert(Entity::new(EntityId(1), "a", "t"));
        store.insert(Entity::new(EntityId(2), "b", "t"));
        store.remove(EntityId(1));
        store.insert(Entity::new(EntityId(3), "c", "t"));

        let names: Vec<_> = store.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(store.get(EntityId(3)).unwrap().name, "c");
    }
}
