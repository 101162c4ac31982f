// ── Reactive entity collection ──
//
// Concurrent storage keyed by entity id, with a sorted snapshot that is
// rebuilt on every mutation so readers never hold a map guard.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::model::{Entity, EntityId};

pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// One collection per entity type.
///
/// Keys are `EntityId::key()`, so `1` and `"1"` address the same entry.
/// Snapshots are ordered by id.
pub(crate) struct EntityCollection<T: Entity> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: ArcSwap<Vec<Arc<T>>>,
}

impl<T: Entity> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Insert or replace one entity. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, entity: T) -> bool {
        let is_new = self.insert(entity);
        self.rebuild_snapshot();
        is_new
    }

    /// Insert or replace many entities with a single snapshot rebuild.
    pub(crate) fn upsert_many(&self, entities: impl IntoIterator<Item = T>) {
        for entity in entities {
            self.insert(entity);
        }
        self.rebuild_snapshot();
    }

    /// Replace the whole collection.
    pub(crate) fn replace_all(&self, entities: impl IntoIterator<Item = T>) {
        self.by_key.clear();
        self.upsert_many(entities);
    }

    /// Remove by id. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, id: &EntityId) -> Option<Arc<T>> {
        let removed = self.by_key.remove(&id.key()).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, id: &EntityId) -> Option<Arc<T>> {
        self.by_key.get(&id.key()).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.load_full()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn insert(&self, entity: T) -> bool {
        let key = entity.entity_id().key();
        self.by_key.insert(key, Arc::new(entity)).is_none()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));
        self.snapshot.store(Arc::new(values));
    }
}
