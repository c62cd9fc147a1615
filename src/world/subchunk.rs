//! Vertical voxel slabs within a chunk

use crate::world::block::Block;
use crate::world::chunk::{CHUNK_SIZE, SUBCHUNK_HEIGHT};
use crate::world::sampler::Biome;

/// One fixed-height vertical slab of voxels belonging to a chunk.
///
/// Voxels are stored at the owning chunk's resolution stride: a slab at
/// stride `r` holds `(CHUNK_SIZE/r)^2 * (SUBCHUNK_HEIGHT/r)` cells. Accessors
/// take local voxel coordinates (full resolution) and map them onto cells, so
/// callers never deal with the stride directly.
#[derive(Clone)]
pub struct SubChunk {
    slab: i32,
    resolution: u32,
    cells: u32,
    cells_y: u32,
    voxels: Vec<Block>,
    /// Terrain height per column cell, from the sampler.
    heights: Vec<i32>,
    /// Biome per column cell, from the sampler.
    biomes: Vec<Biome>,
    non_air: u32,
}

impl SubChunk {
    /// Create an all-air slab at the given vertical index and stride.
    ///
    /// `resolution` must be a power of two dividing both the chunk size and
    /// the slab height.
    pub fn new(slab: i32, resolution: u32) -> Self {
        debug_assert!(resolution.is_power_of_two());
        debug_assert!(resolution <= CHUNK_SIZE as u32);
        let cells = CHUNK_SIZE as u32 / resolution;
        let cells_y = (SUBCHUNK_HEIGHT as u32 / resolution).max(1);
        Self {
            slab,
            resolution,
            cells,
            cells_y,
            voxels: vec![Block::Air; (cells * cells * cells_y) as usize],
            heights: vec![0; (cells * cells) as usize],
            biomes: vec![Biome::Plains; (cells * cells) as usize],
            non_air: 0,
        }
    }

    pub fn slab(&self) -> i32 {
        self.slab
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Horizontal cells per side.
    pub fn cells(&self) -> u32 {
        self.cells
    }

    /// Vertical cells.
    pub fn cells_y(&self) -> u32 {
        self.cells_y
    }

    fn cell_index(&self, lx: i32, ly: i32, lz: i32) -> usize {
        let r = self.resolution as i32;
        let cx = (lx / r) as u32;
        let cy = (ly / r).min(self.cells_y as i32 - 1) as u32;
        let cz = (lz / r) as u32;
        ((cy * self.cells + cz) * self.cells + cx) as usize
    }

    fn column_index(&self, lx: i32, lz: i32) -> usize {
        let r = self.resolution as i32;
        ((lz / r) as u32 * self.cells + (lx / r) as u32) as usize
    }

    /// Read the voxel containing local position (lx, ly, lz).
    /// Coordinates are full-resolution voxel units within the slab.
    pub fn get(&self, lx: i32, ly: i32, lz: i32) -> Block {
        self.voxels[self.cell_index(lx, ly, lz)]
    }

    /// Write the voxel cell containing local position (lx, ly, lz).
    pub fn set(&mut self, lx: i32, ly: i32, lz: i32, block: Block) {
        let idx = self.cell_index(lx, ly, lz);
        let old = self.voxels[idx];
        if old.is_air() && !block.is_air() {
            self.non_air += 1;
        } else if !old.is_air() && block.is_air() {
            self.non_air -= 1;
        }
        self.voxels[idx] = block;
    }

    /// Store the sampled height/biome for the column containing (lx, lz).
    pub fn set_column_aux(&mut self, lx: i32, lz: i32, height: i32, biome: Biome) {
        let idx = self.column_index(lx, lz);
        self.heights[idx] = height;
        self.biomes[idx] = biome;
    }

    pub fn column_height(&self, lx: i32, lz: i32) -> i32 {
        self.heights[self.column_index(lx, lz)]
    }

    pub fn column_biome(&self, lx: i32, lz: i32) -> Biome {
        self.biomes[self.column_index(lx, lz)]
    }

    /// True when every cell is air (slab contributes nothing to the mesh).
    pub fn is_empty(&self) -> bool {
        self.non_air == 0
    }

    /// Estimated heap footprint in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.voxels.len() * std::mem::size_of::<Block>()
            + self.heights.len() * std::mem::size_of::<i32>()
            + self.biomes.len() * std::mem::size_of::<Biome>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let sub = SubChunk::new(3, 1);
        assert!(sub.is_empty());
        assert_eq!(sub.slab(), 3);
        assert_eq!(sub.cells(), CHUNK_SIZE as u32);
    }

    #[test]
    fn test_set_get_full_resolution() {
        let mut sub = SubChunk::new(0, 1);
        sub.set(5, 7, 9, Block::Stone);
        assert_eq!(sub.get(5, 7, 9), Block::Stone);
        assert_eq!(sub.get(5, 7, 8), Block::Air);
        assert!(!sub.is_empty());
    }

    #[test]
    fn test_set_get_coarse_stride() {
        // With stride 4, positions within the same 4x4x4 cell alias.
        let mut sub = SubChunk::new(0, 4);
        sub.set(0, 0, 0, Block::Dirt);
        assert_eq!(sub.get(3, 3, 3), Block::Dirt);
        assert_eq!(sub.get(4, 0, 0), Block::Air);
    }

    #[test]
    fn test_non_air_tracking() {
        let mut sub = SubChunk::new(0, 1);
        sub.set(0, 0, 0, Block::Stone);
        sub.set(1, 0, 0, Block::Stone);
        sub.set(0, 0, 0, Block::Air);
        assert!(!sub.is_empty());
        sub.set(1, 0, 0, Block::Air);
        assert!(sub.is_empty());
    }

    #[test]
    fn test_column_aux() {
        let mut sub = SubChunk::new(0, 2);
        sub.set_column_aux(6, 10, 42, Biome::Desert);
        assert_eq!(sub.column_height(7, 11), 42);
        assert_eq!(sub.column_biome(6, 10), Biome::Desert);
    }

    #[test]
    fn test_coarse_slab_is_smaller() {
        let fine = SubChunk::new(0, 1);
        let coarse = SubChunk::new(0, 8);
        assert!(coarse.memory_bytes() < fine.memory_bytes());
    }
}
