//! Staged display snapshots for the rendering collaborator.
//!
//! `update_fill_data` concatenates every displayed chunk's mesh into one
//! immutable snapshot pair (solid + transparent) and stages it for pickup.
//! Builds are coalesced, not queued: only the newest snapshot is useful to
//! the renderer, so a build is skipped while another is in flight or while a
//! staged pair sits unconsumed. Mesh buffers are read under each chunk's own
//! mesh lock, so a concurrent rebuild can at worst contribute a stale but
//! self-consistent mesh, never a torn one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::core::types::IVec3;
use crate::streaming::stats::StreamStats;
use crate::streaming::store::ChunkStore;
use crate::world::chunk::ChunkKey;
use crate::world::mesh::{DrawIndirectCommand, MeshData, PackedVertex};

/// Per-draw metadata accompanying each indirect command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMeta {
    pub key: ChunkKey,
    pub origin: IVec3,
}

/// An immutable aggregated snapshot for one render pass.
#[derive(Clone, Default)]
pub struct DisplayData {
    pub vertices: Vec<PackedVertex>,
    pub commands: Vec<DrawIndirectCommand>,
    pub meta: Vec<DrawMeta>,
}

impl DisplayData {
    /// Append one chunk's mesh, rebasing vertex and instance offsets by the
    /// running totals.
    fn append(&mut self, mesh: &MeshData, key: ChunkKey) {
        let base_vertex = self.vertices.len() as u32;
        let origin = key.world_origin();
        for command in &mesh.commands {
            self.commands.push(DrawIndirectCommand {
                vertex_count: command.vertex_count,
                instance_count: command.instance_count,
                first_vertex: command.first_vertex + base_vertex,
                first_instance: self.commands.len() as u32,
            });
            self.meta.push(DrawMeta { key, origin });
        }
        self.vertices.extend_from_slice(&mesh.vertices);
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn draw_count(&self) -> usize {
        self.commands.len()
    }
}

/// Solid and transparent snapshots staged together.
#[derive(Clone, Default)]
pub struct DisplayPair {
    pub solid: DisplayData,
    pub transparent: DisplayData,
}

/// Coalescing, double-buffered snapshot producer.
#[derive(Default)]
pub struct DisplayBuilder {
    /// Single-slot in-progress guard; superseded build requests are dropped.
    building: AtomicBool,
    staged: Mutex<Option<DisplayPair>>,
}

impl DisplayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the displayed set into a fresh pair and stage it.
    ///
    /// Returns false when the build was coalesced away (another build in
    /// flight, or a staged pair not yet consumed).
    pub fn update_fill_data(&self, store: &ChunkStore, stats: &StreamStats) -> bool {
        if self.staged.lock().unwrap().is_some() {
            stats.display_skipped();
            return false;
        }
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            stats.display_skipped();
            return false;
        }

        // Chunk list taken under the store locks; mesh reads happen after
        // those locks are released, under each chunk's own mesh lock.
        let mut chunks = store.displayed_chunks();
        chunks.sort_by_key(|chunk| chunk.key);

        let mut pair = DisplayPair::default();
        for chunk in &chunks {
            let mesh = chunk.lock_mesh();
            pair.solid.append(&mesh.solid, chunk.key);
            pair.transparent.append(&mesh.transparent, chunk.key);
            drop(mesh);
            chunk.set_faces_sent(true);
        }

        *self.staged.lock().unwrap() = Some(pair);
        self.building.store(false, Ordering::Release);
        stats.display_built();
        true
    }

    /// Consume the newest staged pair, if any.
    pub fn take_staged(&self) -> Option<DisplayPair> {
        self.staged.lock().unwrap().take()
    }

    pub fn has_staged(&self) -> bool {
        self.staged.lock().unwrap().is_some()
    }
}
