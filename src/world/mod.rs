//! Voxel world model: blocks, chunks, meshing, terrain sampling

pub mod block;
pub mod chunk;
pub mod mesh;
pub mod sampler;
pub mod subchunk;

pub use block::{Block, BlockSource};
pub use chunk::{Chunk, ChunkKey, CHUNK_SIZE, SLAB_COUNT, SUBCHUNK_HEIGHT, WORLD_HEIGHT};
pub use mesh::{ChunkMesh, DrawIndirectCommand, MeshData, PackedVertex};
pub use sampler::{Biome, ColumnSample, NoiseSampler, TerrainParams, TerrainSampler};
pub use subchunk::SubChunk;
