//! Chunk streaming engine for voxel terrain.
//!
//! The engine keeps a ring of terrain chunks resident around a moving
//! camera: it selects candidates by view direction and frustum, assigns a
//! level of detail per ring distance, generates voxel data on a worker pool,
//! replays block edits queued against not-yet-loaded chunks, evicts distant
//! chunks under an LRU budget, and hands the renderer coalesced display
//! snapshots. [`streaming::ChunkLoader`] is the entry point.

pub mod core;
pub mod math;
pub mod streaming;
pub mod world;
