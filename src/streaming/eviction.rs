//! LRU-governed chunk eviction under a count budget.
//!
//! The budget scales with the configured view area plus a slack allowance,
//! and grows by one slot per modified chunk so player edits can never be
//! squeezed out by generation churn. Candidate ranking is done on a
//! read-only snapshot; each actual removal re-checks protection flags under
//! the resident lock, so a chunk that starts building or gets displayed
//! between ranking and removal survives.

use log::{debug, trace};

use crate::core::config::StreamConfig;
use crate::streaming::edits::EditQueue;
use crate::streaming::stats::StreamStats;
use crate::streaming::store::ChunkStore;
use crate::world::chunk::{Chunk, ChunkKey};
use std::sync::Arc;

pub struct EvictionManager {
    render_cells: usize,
    slack_chunks: usize,
}

impl EvictionManager {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            render_cells: config.render_cells(),
            slack_chunks: config.slack_chunks,
        }
    }

    /// Resident chunks allowed right now. Modified chunks each widen the
    /// budget by one so eviction pressure falls only on reproducible data.
    pub fn budget(&self, store: &ChunkStore) -> usize {
        self.render_cells + self.slack_chunks + store.modified_count()
    }

    /// Evict distant unprotected chunks until the resident count fits the
    /// budget. Returns the number of chunks removed.
    pub fn enforce_count_budget(
        &self,
        store: &ChunkStore,
        edits: &EditQueue,
        camera_chunk: ChunkKey,
        stats: &StreamStats,
    ) -> usize {
        let budget = self.budget(store);
        let resident = store.resident_count();
        if resident <= budget {
            return 0;
        }
        let mut excess = resident - budget;

        // Rank on a snapshot, farthest from the camera first. Protection is
        // only advisory here; removal re-checks it authoritatively.
        let mut candidates: Vec<(i32, ChunkKey)> = store
            .resident_snapshot()
            .iter()
            .filter(|chunk| {
                !chunk.is_modified() && !chunk.is_building() && !store.is_displayed(chunk.key)
            })
            .map(|chunk| (camera_chunk.chebyshev(chunk.key), chunk.key))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut evicted = 0;
        for (_, key) in candidates {
            if excess == 0 {
                break;
            }
            if self.evict_chunk_at(store, edits, key, stats).is_some() {
                evicted += 1;
                excess -= 1;
            }
        }
        if evicted > 0 {
            debug!(
                "evicted {} chunks ({} resident, budget {})",
                evicted,
                store.resident_count(),
                budget
            );
        }
        evicted
    }

    /// Remove one chunk if its protection flags still allow it, dropping any
    /// pending edit queue for the slot along with the voxel data.
    pub fn evict_chunk_at(
        &self,
        store: &ChunkStore,
        edits: &EditQueue,
        key: ChunkKey,
        stats: &StreamStats,
    ) -> Option<Arc<Chunk>> {
        match store.remove_if_unprotected(key) {
            Some(chunk) => {
                chunk.release_voxels();
                edits.discard(key);
                stats.chunk_evicted();
                trace!("evicted chunk ({}, {})", key.x, key.z);
                Some(chunk)
            }
            None => {
                stats.eviction_skipped();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IVec3;
    use crate::streaming::edits::PendingBlock;
    use crate::world::block::Block;

    fn config(render_distance: i32, slack: usize) -> StreamConfig {
        StreamConfig {
            render_distance,
            slack_chunks: slack,
            ..StreamConfig::default()
        }
    }

    fn store_with_loaded(keys: &[(i32, i32)]) -> ChunkStore {
        let store = ChunkStore::new();
        for &(x, z) in keys {
            let chunk = Chunk::new(ChunkKey::new(x, z), 1);
            chunk.set_building(false);
            store.insert_or_get(chunk);
        }
        store
    }

    #[test]
    fn test_under_budget_is_noop() {
        let store = store_with_loaded(&[(0, 0), (1, 0)]);
        let edits = EditQueue::new();
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(2, 4));

        assert_eq!(
            mgr.enforce_count_budget(&store, &edits, ChunkKey::new(0, 0), &stats),
            0
        );
        assert_eq!(store.resident_count(), 2);
    }

    #[test]
    fn test_evicts_farthest_first_until_budget() {
        // render_distance 1 gives 1 cell; no slack. Three resident chunks
        // means two must go, in distance order.
        let store = store_with_loaded(&[(0, 0), (3, 0), (8, 0)]);
        let edits = EditQueue::new();
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(1, 0));

        let evicted = mgr.enforce_count_budget(&store, &edits, ChunkKey::new(0, 0), &stats);
        assert_eq!(evicted, 2);
        assert!(store.contains(ChunkKey::new(0, 0)));
        assert!(!store.contains(ChunkKey::new(3, 0)));
        assert!(!store.contains(ChunkKey::new(8, 0)));
        assert_eq!(stats.snapshot().chunks_evicted, 2);
    }

    #[test]
    fn test_modified_chunk_survives_zero_slack() {
        let store = store_with_loaded(&[(5, 5), (9, 9)]);
        store.peek(ChunkKey::new(9, 9)).unwrap().set_modified(true);
        let edits = EditQueue::new();
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(1, 0));

        mgr.enforce_count_budget(&store, &edits, ChunkKey::new(0, 0), &stats);
        // Budget is 1 cell + 1 modified slot; the unmodified chunk goes.
        assert!(store.contains(ChunkKey::new(9, 9)));
        assert!(!store.contains(ChunkKey::new(5, 5)));
    }

    #[test]
    fn test_displayed_and_building_are_protected() {
        let store = store_with_loaded(&[(2, 0), (3, 0), (4, 0)]);
        store.show(ChunkKey::new(4, 0));
        store.peek(ChunkKey::new(3, 0)).unwrap().set_building(true);
        let edits = EditQueue::new();
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(1, 0));

        mgr.enforce_count_budget(&store, &edits, ChunkKey::new(0, 0), &stats);
        assert!(store.contains(ChunkKey::new(4, 0)));
        assert!(store.contains(ChunkKey::new(3, 0)));
        assert!(!store.contains(ChunkKey::new(2, 0)));
    }

    #[test]
    fn test_eviction_discards_pending_edits() {
        let store = store_with_loaded(&[(0, 0), (7, 0)]);
        let edits = EditQueue::new();
        let key = ChunkKey::new(7, 0);
        edits.enqueue(
            key,
            PendingBlock {
                world_pos: IVec3::new(112, 64, 0),
                block: Block::Stone,
                by_player: false,
            },
        );
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(1, 0));

        mgr.evict_chunk_at(&store, &edits, key, &stats);
        assert_eq!(edits.total_pending(), 0);
    }

    #[test]
    fn test_skip_counted_when_protected() {
        let store = store_with_loaded(&[(1, 1)]);
        store.show(ChunkKey::new(1, 1));
        let edits = EditQueue::new();
        let stats = StreamStats::default();
        let mgr = EvictionManager::new(&config(1, 0));

        assert!(mgr
            .evict_chunk_at(&store, &edits, ChunkKey::new(1, 1), &stats)
            .is_none());
        assert_eq!(stats.snapshot().eviction_skips, 1);
    }
}
