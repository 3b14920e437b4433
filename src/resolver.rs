// 🧩 Entity Resolver - arena of canonical entities plus identity indices
//
// Source tables refer to each other by natural keys (NOC code, operator id,
// public-name id). Entities live in a growable arena and are addressed by
// stable positions; indices map a table-local key to one position
// (one-to-one) or to several (one-to-many). Later tables mutate entities in
// place through these positions.

use std::collections::HashMap;

/// Stable position of an entity inside an [`EntityArena`].
pub type EntityId = usize;

/// Key → exactly one entity.
#[derive(Debug, Default)]
pub struct UniqueIndex {
    positions: HashMap<String, EntityId>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<EntityId> {
        self.positions.get(key).copied()
    }

    pub fn insert(&mut self, key: &str, id: EntityId) {
        self.positions.insert(key.to_string(), id);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Key → every entity registered under it (shared foreign keys).
#[derive(Debug, Default)]
pub struct MultiIndex {
    positions: HashMap<String, Vec<EntityId>>,
}

impl MultiIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> &[EntityId] {
        self.positions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Register `id` under `key`. Registering the same pair twice is a no-op.
    pub fn register(&mut self, key: &str, id: EntityId) {
        let ids = self.positions.entry(key.to_string()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }
}

/// Growable list of in-progress entities.
#[derive(Debug, Default)]
pub struct EntityArena<T> {
    entities: Vec<T>,
}

impl<T: Default> EntityArena<T> {
    pub fn new() -> Self {
        EntityArena {
            entities: Vec::new(),
        }
    }

    /// Append an empty entity and return its position.
    pub fn create(&mut self) -> EntityId {
        self.entities.push(T::default());
        self.entities.len() - 1
    }

    /// Position registered under `key`, or a fresh empty entity registered
    /// under it.
    pub fn find_or_create(&mut self, index: &mut UniqueIndex, key: &str) -> EntityId {
        if let Some(id) = index.get(key) {
            return id;
        }
        let id = self.create();
        index.insert(key, id);
        id
    }

    /// Every position registered under `key`. An unknown key yields one new
    /// empty entity; it stays an orphan unless a defining table fills it in,
    /// and the post-resolution filter drops it.
    pub fn find_many_or_create(&mut self, index: &mut MultiIndex, key: &str) -> Vec<EntityId> {
        if index.contains_key(key) {
            return index.get(key).to_vec();
        }
        let id = self.create();
        index.register(key, id);
        vec![id]
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(id)
    }

    /// Apply `merge` to each entity in `ids`.
    pub fn update_each<F>(&mut self, ids: &[EntityId], mut merge: F)
    where
        F: FnMut(&mut T),
    {
        for &id in ids {
            if let Some(entity) = self.entities.get_mut(id) {
                merge(entity);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entities
    }
}
