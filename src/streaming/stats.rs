//! Streaming counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters updated from every engine thread.
#[derive(Debug, Default)]
pub struct StreamStats {
    chunks_generated: AtomicU64,
    chunks_refined: AtomicU64,
    cache_hits: AtomicU64,
    chunks_evicted: AtomicU64,
    eviction_skips: AtomicU64,
    edits_queued: AtomicU64,
    edits_replayed: AtomicU64,
    display_builds: AtomicU64,
    display_skips: AtomicU64,
}

impl StreamStats {
    pub fn chunk_generated(&self) {
        self.chunks_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_refined(&self) {
        self.chunks_refined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_evicted(&self) {
        self.chunks_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn eviction_skipped(&self) {
        self.eviction_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edit_queued(&self) {
        self.edits_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edits_replayed(&self, count: u64) {
        self.edits_replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn display_built(&self) {
        self.display_builds.fetch_add(1, Ordering::Relaxed);
    }

    /// A display build was coalesced away (in flight or staged pair unconsumed).
    pub fn display_skipped(&self) {
        self.display_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            chunks_generated: self.chunks_generated.load(Ordering::Relaxed),
            chunks_refined: self.chunks_refined.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            chunks_evicted: self.chunks_evicted.load(Ordering::Relaxed),
            eviction_skips: self.eviction_skips.load(Ordering::Relaxed),
            edits_queued: self.edits_queued.load(Ordering::Relaxed),
            edits_replayed: self.edits_replayed.load(Ordering::Relaxed),
            display_builds: self.display_builds.load(Ordering::Relaxed),
            display_skips: self.display_skips.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamStatsSnapshot {
    pub chunks_generated: u64,
    pub chunks_refined: u64,
    pub cache_hits: u64,
    pub chunks_evicted: u64,
    pub eviction_skips: u64,
    pub edits_queued: u64,
    pub edits_replayed: u64,
    pub display_builds: u64,
    pub display_skips: u64,
}
