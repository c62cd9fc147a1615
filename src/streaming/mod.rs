//! Chunk streaming engine: candidate selection, async generation dispatch,
//! pending edits, LRU eviction, and double-buffered display handoff

pub mod display;
pub mod edits;
pub mod eviction;
pub mod loader;
pub mod selector;
pub mod stats;
pub mod store;

pub use display::{DisplayBuilder, DisplayData, DisplayPair, DrawMeta};
pub use edits::{EditQueue, PendingBlock};
pub use eviction::EvictionManager;
pub use loader::ChunkLoader;
pub use selector::{pick_next, resolution_for_offset, ring_offsets};
pub use stats::{StreamStats, StreamStatsSnapshot};
pub use store::ChunkStore;
