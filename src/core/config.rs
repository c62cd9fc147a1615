//! Streaming engine configuration.

use std::path::Path;

use serde::Deserialize;

use crate::core::types::Result;
use crate::world::sampler::TerrainParams;

/// Configuration for the chunk streaming engine.
///
/// All fields have sensible defaults; a partial JSON file only needs to name
/// the fields it overrides.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Render distance in chunks (diameter). The selection ring radius is
    /// `render_distance / 2` and the count budget baseline is
    /// `render_distance * render_distance` cells.
    pub render_distance: i32,
    /// Extra resident chunks tolerated beyond the displayed set before
    /// eviction starts removing cached chunks.
    pub slack_chunks: usize,
    /// Worker threads for generation and mesh rebuild tasks.
    pub worker_threads: usize,
    /// Offset magnitude (in chunks) where LOD stride first doubles. Each
    /// subsequent doubling happens at twice the previous threshold.
    pub lod_threshold: f32,
    /// Per-wait timeout when draining a worker batch; the running flag is
    /// re-checked every time this expires.
    pub batch_wait_ms: u64,
    /// World seed fed to the terrain sampler.
    pub seed: u32,
    /// Terrain noise parameters.
    pub terrain: TerrainParams,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            render_distance: 24,
            slack_chunks: 64,
            worker_threads: 4,
            lod_threshold: 2.0,
            batch_wait_ms: 50,
            seed: 12345,
            terrain: TerrainParams::default(),
        }
    }
}

impl StreamConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Selection ring radius in chunks.
    pub fn ring_radius(&self) -> i32 {
        self.render_distance / 2
    }

    /// Baseline chunk count the renderer is expected to keep resident.
    pub fn render_cells(&self) -> usize {
        (self.render_distance * self.render_distance) as usize
    }
}
