//! Terrain sampling collaborator.
//!
//! The streaming engine treats terrain generation as a black box keyed by
//! world column and seed. `NoiseSampler` is the default fractal-noise
//! implementation; tests substitute simpler samplers through the trait.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::Deserialize;

use crate::core::types::Result;
use crate::world::block::Block;

/// Coarse biome classification per column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Biome {
    Plains,
    Desert,
    Mountains,
    Tundra,
}

impl Biome {
    /// Block exposed at the terrain surface.
    pub fn surface_block(self) -> Block {
        match self {
            Biome::Plains => Block::Grass,
            Biome::Desert => Block::Sand,
            Biome::Mountains => Block::Stone,
            Biome::Tundra => Block::Snow,
        }
    }

    /// Block filling the few meters below the surface.
    pub fn shallow_block(self) -> Block {
        match self {
            Biome::Desert => Block::Sand,
            _ => Block::Dirt,
        }
    }
}

/// Result of sampling one world column.
#[derive(Clone, Copy, Debug)]
pub struct ColumnSample {
    /// Terrain surface height (world Y of the topmost solid block).
    pub height: i32,
    pub biome: Biome,
    pub sea_level: i32,
}

impl ColumnSample {
    /// Block at world height `y` for this column, before cave carving.
    pub fn block_at(&self, y: i32) -> Block {
        if y > self.height {
            if y <= self.sea_level {
                return Block::Water;
            }
            return Block::Air;
        }
        if y == self.height {
            if y < self.sea_level {
                // Submerged surface silts over regardless of biome
                return Block::Sand;
            }
            return self.biome.surface_block();
        }
        if self.height - y <= 3 {
            return self.biome.shallow_block();
        }
        Block::Stone
    }
}

/// Deterministic height/biome/cave queries for a world column.
///
/// Both methods are pure functions of world coordinates and the seed, so
/// results are cacheable and never need locking beyond an implementation's
/// own internal state.
pub trait TerrainSampler: Send + Sync {
    /// Sample the column at (wx, wz). `resolution` is the voxel stride the
    /// caller will generate at; samplers may coarsen internally to match.
    fn sample_column(&self, wx: i32, wz: i32, resolution: u32) -> Result<ColumnSample>;

    /// Cave query: true if the voxel at (x, y, z) should be carved to air.
    fn is_air_at(&self, x: i32, y: i32, z: i32) -> bool;
}

/// Parameters controlling fractal terrain generation.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// Horizontal noise scale (larger = smoother terrain).
    pub scale: f64,
    /// Vertical amplitude added on top of `base_height`.
    pub height_scale: f64,
    /// FBM octave count.
    pub octaves: u32,
    /// FBM persistence (0.5 typical).
    pub persistence: f64,
    /// FBM lacunarity (2.0 typical).
    pub lacunarity: f64,
    /// Mean terrain height.
    pub base_height: i32,
    /// World Y at or below which open columns fill with water.
    pub sea_level: i32,
    /// Noise threshold above which solid rock is carved into caves.
    pub cave_threshold: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            scale: 200.0,
            height_scale: 48.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            base_height: 72,
            sea_level: 62,
            cave_threshold: 0.62,
        }
    }
}

/// Fractal-noise terrain sampler: FBM heights, low-frequency biome fields,
/// 3D Perlin cave carving.
pub struct NoiseSampler {
    params: TerrainParams,
    height_noise: Fbm<Perlin>,
    moisture_noise: Perlin,
    cave_noise: Perlin,
}

impl NoiseSampler {
    pub fn new(seed: u32, params: TerrainParams) -> Self {
        let height_noise = Fbm::<Perlin>::new(seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence)
            .set_lacunarity(params.lacunarity);
        Self {
            height_noise,
            moisture_noise: Perlin::new(seed.wrapping_add(1)),
            cave_noise: Perlin::new(seed.wrapping_add(2)),
            params,
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    fn height_at(&self, wx: i32, wz: i32) -> i32 {
        let nx = wx as f64 / self.params.scale;
        let nz = wz as f64 / self.params.scale;
        let h = self.height_noise.get([nx, nz]) * self.params.height_scale;
        self.params.base_height + h.round() as i32
    }

    fn biome_at(&self, wx: i32, wz: i32, height: i32) -> Biome {
        let mountain_line = self.params.base_height + (self.params.height_scale * 0.55) as i32;
        if height >= mountain_line {
            return Biome::Mountains;
        }
        let moisture = self.moisture_noise.get([
            wx as f64 / (self.params.scale * 4.0),
            wz as f64 / (self.params.scale * 4.0),
        ]);
        if moisture < -0.35 {
            Biome::Desert
        } else if moisture > 0.45 {
            Biome::Tundra
        } else {
            Biome::Plains
        }
    }
}

impl TerrainSampler for NoiseSampler {
    fn sample_column(&self, wx: i32, wz: i32, _resolution: u32) -> Result<ColumnSample> {
        let height = self.height_at(wx, wz);
        Ok(ColumnSample {
            height,
            biome: self.biome_at(wx, wz, height),
            sea_level: self.params.sea_level,
        })
    }

    fn is_air_at(&self, x: i32, y: i32, z: i32) -> bool {
        // Caves stay clear of bedrock and of the surface shell
        if y < 6 || y > self.params.base_height + (self.params.height_scale * 0.5) as i32 {
            return false;
        }
        let n = self.cave_noise.get([
            x as f64 / 24.0,
            y as f64 / 24.0,
            z as f64 / 24.0,
        ]);
        n > self.params.cave_threshold
    }
}
