//! Shared chunk state: resident map, displayed set, dirty set, LRU order.
//!
//! The resident map is the sole owner of every chunk; all other components
//! hold a key or a borrowed `Arc` clone, so eviction has a single point of
//! truth for destruction. Each map has its own mutex and every method holds
//! a lock only for the map operation itself, never across generation or
//! meshing. Fixed acquisition order across the engine:
//!
//!   resident -> displayed -> pending-edits -> dirty -> LRU
//!
//! Per-chunk mutexes (subchunks, mesh) are leaves and are never held while
//! taking any of the locks above.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::types::IVec3;
use crate::world::block::{Block, BlockSource};
use crate::world::chunk::{Chunk, ChunkKey};

#[derive(Default)]
pub struct ChunkStore {
    resident: Mutex<HashMap<ChunkKey, Arc<Chunk>>>,
    displayed: Mutex<HashSet<ChunkKey>>,
    dirty: Mutex<HashSet<ChunkKey>>,
    /// Access order, oldest first.
    lru: Mutex<Vec<ChunkKey>>,
    resident_bytes: AtomicUsize,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a resident chunk and mark it recently used.
    pub fn get(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        let chunk = self.resident.lock().unwrap().get(&key).cloned();
        if chunk.is_some() {
            self.touch(key);
        }
        chunk
    }

    /// Look up a resident chunk without touching recency. Used by internal
    /// reads (meshing, display) that should not churn the LRU order.
    pub fn peek(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        self.resident.lock().unwrap().get(&key).cloned()
    }

    /// Insert a chunk, or return the already-resident one for its key.
    ///
    /// The lookup and insert happen in a single critical section, so two
    /// racing builders for the same key resolve to one winner; the loser's
    /// chunk is dropped by the caller. Returns `(chunk, inserted)`.
    pub fn insert_or_get(&self, chunk: Chunk) -> (Arc<Chunk>, bool) {
        use std::collections::hash_map::Entry;

        let key = chunk.key;
        let (arc, inserted) = match self.resident.lock().unwrap().entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(Arc::new(chunk)).clone(), true),
        };
        if inserted {
            self.lru.lock().unwrap().push(key);
        }
        (arc, inserted)
    }

    /// Remove a chunk unconditionally (failed builds). Eviction goes through
    /// `remove_if_unprotected` instead.
    pub fn remove(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        let removed = self.resident.lock().unwrap().remove(&key);
        if let Some(chunk) = &removed {
            self.lru_remove(key);
            self.sub_bytes(chunk.memory_bytes());
        }
        removed
    }

    /// Guarded removal for the eviction path: re-validates under the map
    /// locks that the chunk is still non-building, non-modified, and not
    /// displayed. Any failed guard returns `None` and leaves the chunk
    /// untouched.
    pub fn remove_if_unprotected(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        let removed = {
            let mut resident = self.resident.lock().unwrap();
            let chunk = resident.get(&key)?;
            if chunk.is_building() || chunk.is_modified() {
                return None;
            }
            if self.displayed.lock().unwrap().contains(&key) {
                return None;
            }
            resident.remove(&key)
        };
        if let Some(chunk) = &removed {
            self.lru_remove(key);
            self.sub_bytes(chunk.memory_bytes());
        }
        removed
    }

    /// Move a key to the most-recently-used end.
    pub fn touch(&self, key: ChunkKey) {
        let mut lru = self.lru.lock().unwrap();
        if let Some(pos) = lru.iter().position(|&k| k == key) {
            lru.remove(pos);
        }
        lru.push(key);
    }

    fn lru_remove(&self, key: ChunkKey) {
        let mut lru = self.lru.lock().unwrap();
        if let Some(pos) = lru.iter().position(|&k| k == key) {
            lru.remove(pos);
        }
    }

    /// Current LRU order, oldest first.
    pub fn lru_order(&self) -> Vec<ChunkKey> {
        self.lru.lock().unwrap().clone()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.lock().unwrap().len()
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.resident.lock().unwrap().contains_key(&key)
    }

    /// Snapshot of all resident chunks, for read-only ranking passes.
    pub fn resident_snapshot(&self) -> Vec<Arc<Chunk>> {
        self.resident.lock().unwrap().values().cloned().collect()
    }

    /// Number of resident chunks carrying unsaved edits.
    pub fn modified_count(&self) -> usize {
        self.resident
            .lock()
            .unwrap()
            .values()
            .filter(|chunk| chunk.is_modified())
            .count()
    }

    // --- displayed set ---

    /// Add a key to the displayed set if it is still resident.
    ///
    /// A load can race an eviction of the same key: the chunk finishes
    /// filling, loses its building protection, and is evicted before the
    /// loader shows it. Checking residency under the resident lock keeps
    /// `displayed` a subset of `resident`; the dropped show is legal and the
    /// key simply regenerates on its next selection. Returns whether the key
    /// is now displayed.
    pub fn show(&self, key: ChunkKey) -> bool {
        let resident = self.resident.lock().unwrap();
        if !resident.contains_key(&key) {
            return false;
        }
        self.displayed.lock().unwrap().insert(key);
        true
    }

    pub fn hide(&self, key: ChunkKey) {
        self.displayed.lock().unwrap().remove(&key);
    }

    pub fn is_displayed(&self, key: ChunkKey) -> bool {
        self.displayed.lock().unwrap().contains(&key)
    }

    pub fn displayed_keys(&self) -> Vec<ChunkKey> {
        self.displayed.lock().unwrap().iter().copied().collect()
    }

    /// Resolve the displayed set to chunk handles. Takes the resident lock
    /// before the displayed lock per the global order; both are released
    /// before the caller reads any chunk's mesh.
    pub fn displayed_chunks(&self) -> Vec<Arc<Chunk>> {
        let resident = self.resident.lock().unwrap();
        let displayed = self.displayed.lock().unwrap();
        displayed
            .iter()
            .filter_map(|key| resident.get(key).cloned())
            .collect()
    }

    // --- dirty set ---

    pub fn mark_dirty(&self, key: ChunkKey) {
        self.dirty.lock().unwrap().insert(key);
    }

    pub fn take_dirty(&self) -> Vec<ChunkKey> {
        self.dirty.lock().unwrap().drain().collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().unwrap().len()
    }

    // --- memory accounting ---

    pub fn add_bytes(&self, bytes: usize) {
        self.resident_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn sub_bytes(&self, bytes: usize) {
        // Saturating: estimates may drift slightly under concurrent edits
        let _ = self
            .resident_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes.load(Ordering::Relaxed)
    }
}

impl BlockSource for ChunkStore {
    fn block_at(&self, pos: IVec3) -> Block {
        let key = ChunkKey::from_world(pos.x, pos.z);
        // The resident guard drops before the chunk's own locks are taken
        self.peek(key).map_or(Block::Air, |chunk| chunk.get_block(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_chunk(x: i32, z: i32) -> Chunk {
        let chunk = Chunk::new(ChunkKey::new(x, z), 1);
        chunk.set_building(false);
        chunk
    }

    #[test]
    fn test_insert_and_get() {
        let store = ChunkStore::new();
        let key = ChunkKey::new(1, 2);
        let (_, inserted) = store.insert_or_get(ready_chunk(1, 2));
        assert!(inserted);
        assert_eq!(store.resident_count(), 1);
        assert!(store.get(key).is_some());
    }

    #[test]
    fn test_insert_race_single_winner() {
        let store = ChunkStore::new();
        let (winner, first) = store.insert_or_get(ready_chunk(0, 0));
        let (loser_view, second) = store.insert_or_get(ready_chunk(0, 0));
        assert!(first);
        assert!(!second);
        assert!(Arc::ptr_eq(&winner, &loser_view));
        assert_eq!(store.resident_count(), 1);
    }

    #[test]
    fn test_lru_touch_moves_to_end() {
        let store = ChunkStore::new();
        store.insert_or_get(ready_chunk(0, 0));
        store.insert_or_get(ready_chunk(1, 0));
        store.insert_or_get(ready_chunk(2, 0));

        store.get(ChunkKey::new(0, 0));
        let order = store.lru_order();
        assert_eq!(*order.last().unwrap(), ChunkKey::new(0, 0));
        assert_eq!(order[0], ChunkKey::new(1, 0));
    }

    #[test]
    fn test_peek_does_not_touch() {
        let store = ChunkStore::new();
        store.insert_or_get(ready_chunk(0, 0));
        store.insert_or_get(ready_chunk(1, 0));

        store.peek(ChunkKey::new(0, 0));
        assert_eq!(store.lru_order()[0], ChunkKey::new(0, 0));
    }

    #[test]
    fn test_remove_clears_lru() {
        let store = ChunkStore::new();
        store.insert_or_get(ready_chunk(0, 0));
        store.remove(ChunkKey::new(0, 0));
        assert_eq!(store.resident_count(), 0);
        assert!(store.lru_order().is_empty());
    }

    #[test]
    fn test_remove_if_unprotected_guards() {
        let store = ChunkStore::new();
        let key = ChunkKey::new(0, 0);

        // Building chunk is protected
        store.insert_or_get(Chunk::new(key, 1));
        assert!(store.remove_if_unprotected(key).is_none());
        store.peek(key).unwrap().set_building(false);

        // Displayed chunk is protected
        store.show(key);
        assert!(store.remove_if_unprotected(key).is_none());
        store.hide(key);

        // Modified chunk is protected
        store.peek(key).unwrap().set_modified(true);
        assert!(store.remove_if_unprotected(key).is_none());
        store.peek(key).unwrap().set_modified(false);

        assert!(store.remove_if_unprotected(key).is_some());
        assert_eq!(store.resident_count(), 0);
    }

    #[test]
    fn test_displayed_resolution() {
        let store = ChunkStore::new();
        store.insert_or_get(ready_chunk(0, 0));
        store.insert_or_get(ready_chunk(1, 0));
        store.show(ChunkKey::new(0, 0));

        assert!(store.is_displayed(ChunkKey::new(0, 0)));
        assert_eq!(store.displayed_chunks().len(), 1);
        store.hide(ChunkKey::new(0, 0));
        assert!(store.displayed_chunks().is_empty());
    }

    #[test]
    fn test_show_dropped_when_key_evicted() {
        let store = ChunkStore::new();
        let key = ChunkKey::new(0, 0);
        store.insert_or_get(ready_chunk(0, 0));
        assert!(store.show(key));
        store.hide(key);

        // Eviction wins the race before the loader shows the key
        store.remove(key);
        assert!(!store.show(key));
        assert!(!store.is_displayed(key));
        assert!(store.displayed_chunks().is_empty());
    }

    #[test]
    fn test_dirty_drain() {
        let store = ChunkStore::new();
        store.mark_dirty(ChunkKey::new(0, 0));
        store.mark_dirty(ChunkKey::new(0, 0));
        store.mark_dirty(ChunkKey::new(1, 0));

        let dirty = store.take_dirty();
        assert_eq!(dirty.len(), 2);
        assert_eq!(store.dirty_count(), 0);
    }

    #[test]
    fn test_modified_count() {
        let store = ChunkStore::new();
        store.insert_or_get(ready_chunk(0, 0));
        store.insert_or_get(ready_chunk(1, 0));
        store.peek(ChunkKey::new(1, 0)).unwrap().set_modified(true);
        assert_eq!(store.modified_count(), 1);
    }

    #[test]
    fn test_bytes_accounting_saturates() {
        let store = ChunkStore::new();
        store.add_bytes(100);
        store.sub_bytes(250);
        assert_eq!(store.resident_bytes(), 0);
    }

    #[test]
    fn test_block_source_absent_chunk_is_air() {
        let store = ChunkStore::new();
        assert_eq!(store.block_at(IVec3::new(5, 60, 5)), Block::Air);
    }
}
