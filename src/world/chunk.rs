//! Chunk keys and the chunk container.
//!
//! A `Chunk` is the unit of world streaming: one (x, z) grid cell owning a
//! lazily created stack of `SubChunk` slabs plus a mesh. The resident map
//! holds the only owning handle (`Arc<Chunk>`); all mutation goes through
//! interior mutability so worker threads, the orchestrator, and the render
//! thread can share chunks without tearing. Flags are atomics; the subchunk
//! map and the mesh each sit behind their own mutex, and those two locks are
//! leaves: they are never held while acquiring any of the store-level locks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rayon::prelude::*;

use crate::core::types::{IVec3, Result, Vec3};
use crate::math::Aabb;
use crate::world::block::Block;
use crate::world::mesh::ChunkMesh;
use crate::world::sampler::TerrainSampler;
use crate::world::subchunk::SubChunk;

/// Horizontal voxels per chunk side.
pub const CHUNK_SIZE: i32 = 16;
/// Voxels per subchunk slab, vertically.
pub const SUBCHUNK_HEIGHT: i32 = 16;
/// Total world height in voxels.
pub const WORLD_HEIGHT: i32 = 256;
/// Vertical slabs per chunk.
pub const SLAB_COUNT: i32 = WORLD_HEIGHT / SUBCHUNK_HEIGHT;

/// Integer (x, z) coordinate identifying a chunk column in the world grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given world (x, z) position.
    pub fn from_world(wx: i32, wz: i32) -> Self {
        Self {
            x: wx.div_euclid(CHUNK_SIZE),
            z: wz.div_euclid(CHUNK_SIZE),
        }
    }

    /// World-space origin (minimum corner) of this chunk.
    pub fn world_origin(&self) -> IVec3 {
        IVec3::new(self.x * CHUNK_SIZE, 0, self.z * CHUNK_SIZE)
    }

    /// Offset this key by a ring offset.
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// Chebyshev (ring) distance to another key.
    pub fn chebyshev(&self, other: ChunkKey) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Full-height bounding box of the chunk column.
    pub fn bounds(&self) -> Aabb {
        let origin = self.world_origin();
        let min = Vec3::new(origin.x as f32, 0.0, origin.z as f32);
        let max = min + Vec3::new(CHUNK_SIZE as f32, WORLD_HEIGHT as f32, CHUNK_SIZE as f32);
        Aabb::new(min, max)
    }
}

/// A streamed chunk: voxel state, flags, and mesh for one grid cell.
pub struct Chunk {
    pub key: ChunkKey,
    /// Voxel stride (power of two). Only lowered after creation, and only
    /// through an explicit LOD refinement.
    resolution: AtomicU32,
    fully_loaded: AtomicBool,
    building: AtomicBool,
    modified: AtomicBool,
    faces_sent: AtomicBool,
    /// Slab index -> subchunk, created lazily during fill and edits.
    subchunks: Mutex<BTreeMap<i32, SubChunk>>,
    /// Per-chunk mesh guard: the display builder reads this from another
    /// thread than the one rebuilding it.
    mesh: Mutex<ChunkMesh>,
    memory_bytes: AtomicUsize,
}

impl Chunk {
    /// Create an unfilled chunk. Starts in the building state; the loader
    /// clears the flag once heavy initialization finishes.
    pub fn new(key: ChunkKey, resolution: u32) -> Self {
        debug_assert!(resolution.is_power_of_two() && resolution <= CHUNK_SIZE as u32);
        Self {
            key,
            resolution: AtomicU32::new(resolution),
            fully_loaded: AtomicBool::new(false),
            building: AtomicBool::new(true),
            modified: AtomicBool::new(false),
            faces_sent: AtomicBool::new(false),
            subchunks: Mutex::new(BTreeMap::new()),
            mesh: Mutex::new(ChunkMesh::default()),
            memory_bytes: AtomicUsize::new(0),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution.load(Ordering::Acquire)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    pub fn mark_fully_loaded(&self) {
        self.fully_loaded.store(true, Ordering::Release);
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    pub fn set_building(&self, building: bool) {
        self.building.store(building, Ordering::Release);
    }

    /// Claim the building flag. Returns false if another thread holds it;
    /// the caller must skip rather than wait.
    pub fn try_begin_building(&self) -> bool {
        self.building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn set_modified(&self, modified: bool) {
        self.modified.store(modified, Ordering::Release);
    }

    pub fn faces_sent(&self) -> bool {
        self.faces_sent.load(Ordering::Acquire)
    }

    pub fn set_faces_sent(&self, sent: bool) {
        self.faces_sent.store(sent, Ordering::Release);
    }

    /// Estimated heap footprint of voxel data, in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    /// Generate voxel state from the sampler at the current resolution.
    ///
    /// Columns are sampled in parallel, then written into lazily created
    /// slabs. Replaces any existing voxel state, so it doubles as the
    /// refinement path. Runs without holding any store-level lock.
    pub fn fill(&self, sampler: &dyn TerrainSampler) -> Result<()> {
        let res = self.resolution() as i32;
        let origin = self.key.world_origin();
        let cells = CHUNK_SIZE / res;

        let columns = (0..cells * cells)
            .into_par_iter()
            .map(|i| {
                let cx = i % cells;
                let cz = i / cells;
                sampler.sample_column(origin.x + cx * res, origin.z + cz * res, res as u32)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut subs: BTreeMap<i32, SubChunk> = BTreeMap::new();
        for cz in 0..cells {
            for cx in 0..cells {
                let column = columns[(cz * cells + cx) as usize];
                let lx = cx * res;
                let lz = cz * res;
                let wx = origin.x + lx;
                let wz = origin.z + lz;
                // Slabs entirely above both terrain and sea stay absent
                let top = column.height.max(column.sea_level).min(WORLD_HEIGHT - 1);
                let mut y = 0;
                while y <= top {
                    let mut block = column.block_at(y);
                    if block.is_solid() && sampler.is_air_at(wx, y, wz) {
                        block = Block::Air;
                    }
                    if !block.is_air() {
                        let slab = y / SUBCHUNK_HEIGHT;
                        let sub = subs
                            .entry(slab)
                            .or_insert_with(|| SubChunk::new(slab, res as u32));
                        sub.set(lx, y % SUBCHUNK_HEIGHT, lz, block);
                        sub.set_column_aux(lx, lz, column.height, column.biome);
                    }
                    y += res;
                }
            }
        }

        let bytes: usize = subs.values().map(SubChunk::memory_bytes).sum();
        *self.subchunks.lock().unwrap() = subs;
        self.memory_bytes.store(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// Refine to a finer resolution by regenerating voxel state.
    ///
    /// No-op if the requested stride is not strictly finer. The caller must
    /// hold the building flag; modified chunks are never refined because
    /// regeneration would discard their edits.
    pub fn refine_to(&self, resolution: u32, sampler: &dyn TerrainSampler) -> Result<()> {
        let current = self.resolution();
        if resolution >= current || self.is_modified() {
            return Ok(());
        }
        self.resolution.store(resolution, Ordering::Release);
        // fill() samples every column before it touches any slab, so a
        // sampler failure leaves the coarse voxels intact; restoring the
        // stride keeps the pair consistent and the refinement retryable.
        if let Err(err) = self.fill(sampler) {
            self.resolution.store(current, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }

    fn locate(&self, pos: IVec3) -> Option<(i32, i32, i32, i32)> {
        if pos.y < 0 || pos.y >= WORLD_HEIGHT {
            return None;
        }
        let origin = self.key.world_origin();
        let lx = pos.x - origin.x;
        let lz = pos.z - origin.z;
        if lx < 0 || lx >= CHUNK_SIZE || lz < 0 || lz >= CHUNK_SIZE {
            return None;
        }
        Some((lx, pos.y / SUBCHUNK_HEIGHT, pos.y % SUBCHUNK_HEIGHT, lz))
    }

    /// Read the block at a world position inside this chunk. Out-of-bounds
    /// and absent-slab reads return air.
    pub fn get_block(&self, pos: IVec3) -> Block {
        let Some((lx, slab, ly, lz)) = self.locate(pos) else {
            return Block::Air;
        };
        let subs = self.subchunks.lock().unwrap();
        subs.get(&slab).map_or(Block::Air, |sub| sub.get(lx, ly, lz))
    }

    /// Write the block at a world position, creating the slab on demand.
    ///
    /// Returns the bytes newly allocated when the write created a slab,
    /// zero otherwise, so callers can keep global byte accounting current.
    pub fn set_block(&self, pos: IVec3, block: Block) -> usize {
        let Some((lx, slab, ly, lz)) = self.locate(pos) else {
            return 0;
        };
        let res = self.resolution();
        let mut subs = self.subchunks.lock().unwrap();
        let mut added = 0;
        let sub = subs.entry(slab).or_insert_with(|| {
            let fresh = SubChunk::new(slab, res);
            added = fresh.memory_bytes();
            fresh
        });
        sub.set(lx, ly, lz, block);
        if added > 0 {
            self.memory_bytes.fetch_add(added, Ordering::Relaxed);
        }
        added
    }

    /// Clone the slab map for meshing. Taken instead of holding the lock so
    /// the mesher can query neighbor chunks without nesting per-chunk locks.
    pub fn subchunks_snapshot(&self) -> BTreeMap<i32, SubChunk> {
        self.subchunks.lock().unwrap().clone()
    }

    /// Drop all voxel state. Used on eviction to release memory before the
    /// last `Arc` reference goes away.
    pub fn release_voxels(&self) {
        self.subchunks.lock().unwrap().clear();
        *self.mesh.lock().unwrap() = ChunkMesh::default();
        self.memory_bytes.store(0, Ordering::Relaxed);
    }

    /// Lock the mesh for reading. The guard must not be held across any
    /// store-level lock acquisition.
    pub fn lock_mesh(&self) -> MutexGuard<'_, ChunkMesh> {
        self.mesh.lock().unwrap()
    }

    /// Swap in a freshly built mesh.
    pub fn store_mesh(&self, mesh: ChunkMesh) {
        *self.mesh.lock().unwrap() = mesh;
        self.faces_sent.store(false, Ordering::Release);
    }

    pub fn has_mesh(&self) -> bool {
        !self.mesh.lock().unwrap().is_empty()
    }
}
