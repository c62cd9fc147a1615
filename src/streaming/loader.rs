//! Streaming orchestrator: selection, generation dispatch, edit replay,
//! display refresh, and eviction, driven from a dedicated thread.
//!
//! The orchestrator thread reacts to camera chunk crossings by re-running
//! ring selection and dispatching generation onto a tokio blocking pool.
//! Between crossings it drains the dirty set into mesh rebuilds. All chunk
//! state lives in the [`ChunkStore`]; workers share it through `Arc` and the
//! per-chunk atomic flags arbitrate who builds what.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::core::camera::CameraSnapshot;
use crate::core::config::StreamConfig;
use crate::core::types::{IVec2, IVec3, Result};
use crate::streaming::display::{DisplayBuilder, DisplayPair};
use crate::streaming::edits::{EditQueue, PendingBlock};
use crate::streaming::eviction::EvictionManager;
use crate::streaming::selector::{pick_next, resolution_for_offset, ring_offsets};
use crate::streaming::stats::{StreamStats, StreamStatsSnapshot};
use crate::streaming::store::ChunkStore;
use crate::world::block::Block;
use crate::world::chunk::{Chunk, ChunkKey, WORLD_HEIGHT};
use crate::world::mesh::build_chunk_mesh;
use crate::world::sampler::TerrainSampler;

/// Owner of the streaming pipeline. Constructed once, shared as `Arc`.
pub struct ChunkLoader {
    store: Arc<ChunkStore>,
    edits: EditQueue,
    sampler: Arc<dyn TerrainSampler>,
    display: DisplayBuilder,
    eviction: EvictionManager,
    stats: StreamStats,
    config: StreamConfig,
    camera: Mutex<CameraSnapshot>,
    running: AtomicBool,
    runtime: Runtime,
    orchestrator: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ChunkLoader {
    pub fn new(config: StreamConfig, sampler: Arc<dyn TerrainSampler>) -> Result<Arc<Self>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("chunk-worker")
            .enable_time()
            .build()?;
        Ok(Arc::new(Self {
            store: Arc::new(ChunkStore::new()),
            edits: EditQueue::new(),
            sampler,
            display: DisplayBuilder::new(),
            eviction: EvictionManager::new(&config),
            stats: StreamStats::default(),
            camera: Mutex::new(CameraSnapshot::default()),
            running: AtomicBool::new(false),
            runtime,
            orchestrator: Mutex::new(None),
            config,
        }))
    }

    /// Spawn the orchestrator thread. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("chunk-orchestrator".into())
            .spawn(move || this.orchestrator_loop());
        match spawned {
            Ok(handle) => {
                *self.orchestrator.lock().unwrap() = Some(handle);
                info!(
                    "streaming started: radius {} chunks, {} workers",
                    self.config.ring_radius(),
                    self.config.worker_threads
                );
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                error!("failed to spawn orchestrator thread: {err}");
            }
        }
    }

    /// Signal shutdown and join the orchestrator. In-flight generation tasks
    /// are abandoned, not awaited.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.orchestrator.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("streaming stopped: {:?}", self.stats.snapshot());
    }

    fn orchestrator_loop(self: Arc<Self>) {
        let mut last_origin: Option<ChunkKey> = None;
        while self.running.load(Ordering::Acquire) {
            let origin = self.camera.lock().unwrap().chunk_key();
            if last_origin != Some(origin) {
                debug!("camera crossed into chunk ({}, {})", origin.x, origin.z);
                self.unload_chunks(origin);
                last_origin = Some(origin);
                self.run_selection(origin);
            } else if self.store.dirty_count() > 0 {
                self.flush_dirty();
                self.display.update_fill_data(&self.store, &self.stats);
            } else {
                thread::sleep(Duration::from_millis(20));
            }
        }
    }

    /// One selection pass around `origin`: repeatedly pick the best remaining
    /// ring offset under the current camera and dispatch its load. Aborts
    /// early when the camera leaves the origin's neighborhood or shutdown is
    /// requested; the next pass starts fresh.
    fn run_selection(self: &Arc<Self>, origin: ChunkKey) {
        let mut remaining = ring_offsets(self.config.ring_radius());
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        let max_in_flight = self.config.worker_threads.max(1) * 2;

        while self.running.load(Ordering::Acquire) {
            let camera = self.camera.lock().unwrap().clone();
            if camera.chunk_key().chebyshev(origin) > 1 {
                break;
            }
            let Some(index) = pick_next(&remaining, &camera, origin) else {
                break;
            };
            let offset = remaining.swap_remove(index);
            let resolution = resolution_for_offset(offset, self.config.lod_threshold);
            let this = Arc::clone(self);
            in_flight.push(self.runtime.spawn_blocking(move || {
                if let Err(err) = this.load_chunk(offset, origin, resolution) {
                    warn!(
                        "chunk load failed at offset ({}, {}): {err}",
                        offset.x, offset.y
                    );
                }
            }));
            if in_flight.len() >= max_in_flight {
                self.wait_batch(&mut in_flight);
            }
        }
        self.wait_batch(&mut in_flight);
    }

    /// Drain a batch of worker handles, re-checking the shutdown flag every
    /// `batch_wait_ms` so stop requests are never blocked on slow terrain.
    fn wait_batch(&self, handles: &mut Vec<JoinHandle<()>>) {
        let wait = Duration::from_millis(self.config.batch_wait_ms.max(1));
        for mut handle in handles.drain(..) {
            loop {
                if !self.running.load(Ordering::Acquire) {
                    handle.abort();
                    break;
                }
                let done = self
                    .runtime
                    .block_on(async { tokio::time::timeout(wait, &mut handle).await });
                if done.is_ok() {
                    break;
                }
            }
        }
    }

    /// Make the chunk at `origin + offset` resident and displayed.
    ///
    /// Cache hits refine in place when the requested stride is finer, unless
    /// the chunk carries edits. On a miss the terrain is probed before any
    /// allocation, then exactly one caller wins the insert race and fills.
    pub fn load_chunk(
        self: &Arc<Self>,
        offset: IVec2,
        origin: ChunkKey,
        resolution: u32,
    ) -> Result<Arc<Chunk>> {
        let key = origin.offset(offset.x, offset.y);

        if let Some(chunk) = self.store.peek(key) {
            self.stats.cache_hit();
            if resolution < chunk.resolution() && !chunk.is_modified() && chunk.try_begin_building()
            {
                let old_bytes = chunk.memory_bytes();
                let refined = chunk.refine_to(resolution, self.sampler.as_ref());
                chunk.set_building(false);
                refined?;
                self.store.sub_bytes(old_bytes);
                self.store.add_bytes(chunk.memory_bytes());
                self.stats.chunk_refined();
                self.rebuild_chunk_mesh(&chunk);
            }
            self.apply_pending_for(&chunk);
            self.store.touch(key);
            self.finish_load(&chunk);
            return Ok(chunk);
        }

        // Probe the sampler before committing a resident slot.
        let probe_origin = key.world_origin();
        self.sampler
            .sample_column(probe_origin.x, probe_origin.z, resolution)?;

        let (chunk, inserted) = self.store.insert_or_get(Chunk::new(key, resolution));
        if inserted {
            match chunk.fill(self.sampler.as_ref()) {
                Ok(()) => {
                    self.store.add_bytes(chunk.memory_bytes());
                    chunk.set_building(false);
                    chunk.mark_fully_loaded();
                    self.stats.chunk_generated();
                    self.apply_pending_for(&chunk);
                }
                Err(err) => {
                    chunk.set_building(false);
                    self.store.remove(key);
                    return Err(err);
                }
            }
        } else {
            // Lost the insert race; the winner owns the fill.
            self.stats.cache_hit();
            self.apply_pending_for(&chunk);
        }
        self.store.touch(key);
        self.finish_load(&chunk);
        Ok(chunk)
    }

    /// Post-load bookkeeping: show, mesh if absent, refresh the display
    /// snapshot, enforce the eviction budget. Skipped while another worker
    /// still holds the building flag, and when a concurrent eviction won the
    /// race for this key (it will regenerate on its next selection).
    fn finish_load(&self, chunk: &Arc<Chunk>) {
        if chunk.is_building() {
            return;
        }
        if !self.store.show(chunk.key) {
            return;
        }
        if !chunk.has_mesh() {
            self.rebuild_chunk_mesh(chunk);
        }
        self.display.update_fill_data(&self.store, &self.stats);
        let camera_chunk = self.camera.lock().unwrap().chunk_key();
        self.eviction
            .enforce_count_budget(&self.store, &self.edits, camera_chunk, &self.stats);
    }

    /// Replay the chunk's queued edits in submission order. Draining removes
    /// the queue, so a second replay for the same key applies nothing.
    fn apply_pending_for(&self, chunk: &Arc<Chunk>) {
        if chunk.is_building() {
            return;
        }
        let pending = self.edits.drain(chunk.key);
        if pending.is_empty() {
            return;
        }
        let count = pending.len() as u64;
        let mut slab_bytes = 0;
        for edit in pending {
            slab_bytes += chunk.set_block(edit.world_pos, edit.block);
            if edit.by_player {
                chunk.set_modified(true);
            }
        }
        if slab_bytes > 0 {
            self.store.add_bytes(slab_bytes);
        }
        self.store.mark_dirty(chunk.key);
        self.stats.edits_replayed(count);
        debug!(
            "replayed {count} pending edits into chunk ({}, {})",
            chunk.key.x, chunk.key.z
        );
    }

    /// Apply a block edit now if the target chunk is ready, else queue it
    /// for replay on load. Returns whether the edit was applied immediately.
    pub fn set_block_or_queue(&self, world_pos: IVec3, block: Block, by_player: bool) -> bool {
        let key = ChunkKey::from_world(world_pos.x, world_pos.z);
        if let Some(chunk) = self.store.peek(key) {
            if !chunk.is_building() {
                let slab_bytes = chunk.set_block(world_pos, block);
                if slab_bytes > 0 {
                    self.store.add_bytes(slab_bytes);
                }
                if by_player {
                    chunk.set_modified(true);
                }
                self.store.mark_dirty(key);
                return true;
            }
        }
        self.edits.enqueue(
            key,
            PendingBlock {
                world_pos,
                block,
                by_player,
            },
        );
        self.stats.edit_queued();
        false
    }

    /// Hide chunks outside the ring around the new origin, then rebalance.
    fn unload_chunks(self: &Arc<Self>, origin: ChunkKey) {
        self.flush_dirty();
        let radius = self.config.ring_radius();
        for key in self.store.displayed_keys() {
            if origin.chebyshev(key) > radius {
                self.store.hide(key);
            }
        }
        self.display.update_fill_data(&self.store, &self.stats);
        self.eviction
            .enforce_count_budget(&self.store, &self.edits, origin, &self.stats);
    }

    /// Remesh every dirty chunk on the worker pool and wait for the batch.
    fn flush_dirty(self: &Arc<Self>) {
        let dirty = self.store.take_dirty();
        if dirty.is_empty() {
            return;
        }
        let mut handles = Vec::new();
        for key in dirty {
            let Some(chunk) = self.store.peek(key) else {
                continue;
            };
            let this = Arc::clone(self);
            handles.push(
                self.runtime
                    .spawn_blocking(move || this.rebuild_chunk_mesh(&chunk)),
            );
        }
        self.wait_batch(&mut handles);
    }

    /// Rebuild one chunk's mesh from a voxel snapshot. Cross-chunk neighbor
    /// reads go through the store, so no per-chunk lock is held while the
    /// mesher runs.
    fn rebuild_chunk_mesh(&self, chunk: &Arc<Chunk>) {
        let snapshot = chunk.subchunks_snapshot();
        let mesh = build_chunk_mesh(chunk.key, chunk.resolution(), &snapshot, self.store.as_ref());
        chunk.store_mesh(mesh);
    }

    /// Replace the camera snapshot. The orchestrator reacts on its next tick.
    pub fn update_camera(&self, camera: CameraSnapshot) {
        *self.camera.lock().unwrap() = camera;
    }

    /// Block at a world position, air if the chunk is not resident. Reads
    /// count as LRU touches.
    pub fn get_block(&self, pos: IVec3) -> Block {
        let key = ChunkKey::from_world(pos.x, pos.z);
        self.store
            .get(key)
            .map_or(Block::Air, |chunk| chunk.get_block(pos))
    }

    /// World Y of the highest solid block in the column, if any.
    pub fn find_top_block_y(&self, x: i32, z: i32) -> Option<i32> {
        self.find_block_under(x, z, WORLD_HEIGHT - 1)
    }

    /// Scan downward from `start_y` for the first solid block.
    pub fn find_block_under(&self, x: i32, z: i32, start_y: i32) -> Option<i32> {
        let key = ChunkKey::from_world(x, z);
        let chunk = self.store.get(key)?;
        let mut y = start_y.min(WORLD_HEIGHT - 1);
        while y >= 0 {
            if chunk.get_block(IVec3::new(x, y, z)).is_solid() {
                return Some(y);
            }
            y -= 1;
        }
        None
    }

    /// Consume the newest staged display snapshot, if one is ready.
    pub fn take_display_data(&self) -> Option<DisplayPair> {
        self.display.take_staged()
    }

    /// Keys currently eligible for rendering.
    pub fn displayed_chunks_snapshot(&self) -> Vec<ChunkKey> {
        self.store.displayed_keys()
    }

    pub fn has_renderable_chunks(&self) -> bool {
        self.store
            .displayed_chunks()
            .iter()
            .any(|chunk| chunk.has_mesh())
    }

    pub fn resident_count(&self) -> usize {
        self.store.resident_count()
    }

    pub fn displayed_count(&self) -> usize {
        self.store.displayed_keys().len()
    }

    pub fn resident_bytes(&self) -> usize {
        self.store.resident_bytes()
    }

    pub fn pending_edit_count(&self) -> usize {
        self.edits.total_pending()
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::sampler::{Biome, ColumnSample};

    struct FlatSampler {
        height: i32,
    }

    impl TerrainSampler for FlatSampler {
        fn sample_column(&self, _wx: i32, _wz: i32, _resolution: u32) -> Result<ColumnSample> {
            Ok(ColumnSample {
                height: self.height,
                biome: Biome::Plains,
                sea_level: 0,
            })
        }

        fn is_air_at(&self, _x: i32, _y: i32, _z: i32) -> bool {
            false
        }
    }

    fn test_loader(render_distance: i32, slack: usize) -> Arc<ChunkLoader> {
        let config = StreamConfig {
            render_distance,
            slack_chunks: slack,
            worker_threads: 2,
            batch_wait_ms: 5,
            ..StreamConfig::default()
        };
        ChunkLoader::new(config, Arc::new(FlatSampler { height: 40 })).unwrap()
    }

    #[test]
    fn test_load_chunk_makes_resident_and_displayed() {
        let loader = test_loader(8, 64);
        let origin = ChunkKey::new(0, 0);
        let chunk = loader.load_chunk(IVec2::ZERO, origin, 1).unwrap();

        assert!(chunk.is_fully_loaded());
        assert!(!chunk.is_building());
        assert!(chunk.has_mesh());
        assert_eq!(loader.resident_count(), 1);
        assert_eq!(loader.displayed_count(), 1);
        assert_eq!(loader.stats().chunks_generated, 1);
    }

    #[test]
    fn test_queued_edit_replays_on_load() {
        let loader = test_loader(8, 64);
        let pos = IVec3::new(3 * 16 + 5, 60, 3 * 16 + 7);

        // Target chunk absent, so the edit queues.
        assert!(!loader.set_block_or_queue(pos, Block::Stone, true));
        assert_eq!(loader.pending_edit_count(), 1);

        let chunk = loader
            .load_chunk(IVec2::new(3, 3), ChunkKey::new(0, 0), 1)
            .unwrap();
        assert_eq!(chunk.get_block(pos), Block::Stone);
        assert!(chunk.is_modified());
        assert_eq!(loader.pending_edit_count(), 0);
        assert_eq!(loader.stats().edits_replayed, 1);
    }

    #[test]
    fn test_replay_is_not_repeated_on_reload() {
        let loader = test_loader(8, 64);
        let pos = IVec3::new(21, 60, 5);
        loader.set_block_or_queue(pos, Block::Stone, false);

        let origin = ChunkKey::new(0, 0);
        loader.load_chunk(IVec2::new(1, 0), origin, 1).unwrap();
        assert_eq!(loader.stats().edits_replayed, 1);

        // Second load is a cache hit with an empty queue.
        loader.load_chunk(IVec2::new(1, 0), origin, 1).unwrap();
        assert_eq!(loader.stats().edits_replayed, 1);
        assert_eq!(loader.stats().cache_hits, 1);
    }

    #[test]
    fn test_edit_applies_directly_when_resident() {
        let loader = test_loader(8, 64);
        loader
            .load_chunk(IVec2::ZERO, ChunkKey::new(0, 0), 1)
            .unwrap();

        let pos = IVec3::new(4, 50, 4);
        assert!(loader.set_block_or_queue(pos, Block::Air, true));
        assert_eq!(loader.get_block(pos), Block::Air);
        assert_eq!(loader.pending_edit_count(), 0);
    }

    #[test]
    fn test_concurrent_loads_share_one_chunk() {
        let loader = test_loader(8, 64);
        let origin = ChunkKey::new(0, 0);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let loader = Arc::clone(&loader);
                thread::spawn(move || loader.load_chunk(IVec2::new(2, 2), origin, 1))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(loader.resident_count(), 1);
        assert_eq!(loader.stats().chunks_generated, 1);
    }

    #[test]
    fn test_cache_hit_refines_to_finer_stride() {
        let loader = test_loader(8, 64);
        let origin = ChunkKey::new(0, 0);
        let chunk = loader.load_chunk(IVec2::new(4, 0), origin, 4).unwrap();
        assert_eq!(chunk.resolution(), 4);

        let chunk = loader.load_chunk(IVec2::new(4, 0), origin, 1).unwrap();
        assert_eq!(chunk.resolution(), 1);
        assert_eq!(loader.stats().chunks_refined, 1);
    }

    #[test]
    fn test_modified_chunk_is_never_refined() {
        let loader = test_loader(8, 64);
        let origin = ChunkKey::new(0, 0);
        let chunk = loader.load_chunk(IVec2::new(4, 0), origin, 4).unwrap();
        let pos = IVec3::new(4 * 16 + 2, 40, 2);
        loader.set_block_or_queue(pos, Block::Air, true);

        loader.load_chunk(IVec2::new(4, 0), origin, 1).unwrap();
        assert_eq!(chunk.resolution(), 4);
        assert_eq!(chunk.get_block(pos), Block::Air);
        assert_eq!(loader.stats().chunks_refined, 0);
    }

    #[test]
    fn test_failed_refine_retries_after_sampler_recovers() {
        struct FlakySampler {
            height: i32,
            fail: AtomicBool,
        }

        impl TerrainSampler for FlakySampler {
            fn sample_column(&self, _wx: i32, _wz: i32, _resolution: u32) -> Result<ColumnSample> {
                if self.fail.load(Ordering::Relaxed) {
                    return Err(crate::core::Error::Sampler("transient failure".into()));
                }
                Ok(ColumnSample {
                    height: self.height,
                    biome: Biome::Plains,
                    sea_level: 0,
                })
            }

            fn is_air_at(&self, _x: i32, _y: i32, _z: i32) -> bool {
                false
            }
        }

        let config = StreamConfig {
            render_distance: 8,
            worker_threads: 2,
            batch_wait_ms: 5,
            ..StreamConfig::default()
        };
        let sampler = Arc::new(FlakySampler {
            height: 40,
            fail: AtomicBool::new(false),
        });
        let loader =
            ChunkLoader::new(config, sampler.clone() as Arc<dyn TerrainSampler>).unwrap();
        let origin = ChunkKey::new(0, 0);
        let chunk = loader.load_chunk(IVec2::new(4, 0), origin, 4).unwrap();
        assert_eq!(chunk.resolution(), 4);

        // Refinement fails mid-load; stride and voxels stay coarse
        sampler.fail.store(true, Ordering::Relaxed);
        assert!(loader.load_chunk(IVec2::new(4, 0), origin, 1).is_err());
        assert_eq!(chunk.resolution(), 4);
        assert_eq!(loader.stats().chunks_refined, 0);
        assert_eq!(chunk.get_block(IVec3::new(4 * 16, 40, 0)), Block::Grass);

        // The next candidate pass retries and succeeds
        sampler.fail.store(false, Ordering::Relaxed);
        loader.load_chunk(IVec2::new(4, 0), origin, 1).unwrap();
        assert_eq!(chunk.resolution(), 1);
        assert_eq!(loader.stats().chunks_refined, 1);
    }

    #[test]
    fn test_edit_created_slab_grows_resident_bytes() {
        let loader = test_loader(8, 64);
        loader
            .load_chunk(IVec2::ZERO, ChunkKey::new(0, 0), 1)
            .unwrap();
        let before = loader.resident_bytes();

        // Height 40 terrain has no slab at y = 200; the edit allocates one
        assert!(loader.set_block_or_queue(IVec3::new(3, 200, 3), Block::Stone, true));
        assert!(loader.resident_bytes() > before);

        // Editing the same slab again allocates nothing further
        let after = loader.resident_bytes();
        loader.set_block_or_queue(IVec3::new(4, 201, 4), Block::Stone, true);
        assert_eq!(loader.resident_bytes(), after);
    }

    #[test]
    fn test_top_block_matches_sampler_height() {
        let loader = test_loader(8, 64);
        loader
            .load_chunk(IVec2::ZERO, ChunkKey::new(0, 0), 1)
            .unwrap();
        assert_eq!(loader.find_top_block_y(5, 5), Some(40));
        assert_eq!(loader.find_block_under(5, 5, 30), Some(30));
    }

    #[test]
    fn test_display_snapshot_available_after_load() {
        let loader = test_loader(8, 64);
        loader
            .load_chunk(IVec2::ZERO, ChunkKey::new(0, 0), 1)
            .unwrap();

        assert!(loader.has_renderable_chunks());
        let pair = loader.take_display_data().expect("snapshot staged");
        assert!(!pair.solid.is_empty());
        assert!(loader.take_display_data().is_none());
    }

    #[test]
    fn test_budget_enforced_during_loads() {
        // Radius 1 ring, one-cell view area, no slack.
        let loader = test_loader(2, 0);
        let origin = ChunkKey::new(0, 0);
        for offset in ring_offsets(4) {
            let _ = loader.load_chunk(offset, origin, 1);
        }
        // Displayed chunks are protected, so the floor is the displayed set,
        // not the raw cell budget.
        let budget = loader.config.render_cells() + loader.displayed_count();
        assert!(loader.resident_count() <= budget.max(loader.displayed_count()));
    }
}
