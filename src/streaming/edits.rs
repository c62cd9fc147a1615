//! Pending-edit queue for chunks that are not yet ready.
//!
//! Edits can arrive for chunks still streaming in (the player breaks a block
//! at the render-distance edge). Dropping them would corrupt world state, so
//! they are durably queued per chunk key and replayed exactly once, in
//! submission order, when the target chunk becomes ready.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::types::IVec3;
use crate::world::block::Block;
use crate::world::chunk::ChunkKey;

/// A queued block edit awaiting its target chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingBlock {
    pub world_pos: IVec3,
    pub block: Block,
    pub by_player: bool,
}

/// FIFO edit queues keyed by chunk coordinate. Own mutex; in the global lock
/// order this sits after the resident and displayed maps.
#[derive(Default)]
pub struct EditQueue {
    pending: Mutex<HashMap<ChunkKey, Vec<PendingBlock>>>,
}

impl EditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edit to the key's queue.
    pub fn enqueue(&self, key: ChunkKey, edit: PendingBlock) {
        self.pending.lock().unwrap().entry(key).or_default().push(edit);
    }

    /// Atomically take and clear the key's queue, in insertion order.
    /// Draining an absent or empty queue yields nothing, so replay is
    /// idempotent.
    pub fn drain(&self, key: ChunkKey) -> Vec<PendingBlock> {
        self.pending.lock().unwrap().remove(&key).unwrap_or_default()
    }

    /// Discard the key's queue without replay. Used when an evicted chunk's
    /// orphaned queue is released.
    pub fn discard(&self, key: ChunkKey) {
        self.pending.lock().unwrap().remove(&key);
    }

    pub fn pending_for(&self, key: ChunkKey) -> usize {
        self.pending.lock().unwrap().get(&key).map_or(0, Vec::len)
    }

    pub fn total_pending(&self) -> usize {
        self.pending.lock().unwrap().values().map(Vec::len).sum()
    }
}
