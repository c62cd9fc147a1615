//! Face-list meshing of chunk voxels into packed vertex records.
//!
//! Face lists are derived data: this module always rebuilds them from the
//! voxel state, never patches an existing list. The geometry is the simple
//! visible-face reduction (one quad per exposed cell face); merging quads is
//! a renderer concern and out of scope here.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};

use crate::core::types::{IVec3, Vec3};
use crate::world::block::{Block, BlockSource};
use crate::world::chunk::{ChunkKey, CHUNK_SIZE, SUBCHUNK_HEIGHT, WORLD_HEIGHT};
use crate::world::subchunk::SubChunk;

/// One mesh vertex: world position plus packed attributes
/// (bits 0..8 block id, bits 8..11 face direction).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub data: u32,
}

/// Indirect draw command, laid out GPU-style.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Vertex buffer plus per-slab draw commands for one render pass.
#[derive(Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<PackedVertex>,
    pub commands: Vec<DrawIndirectCommand>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<PackedVertex>()
            + self.commands.len() * std::mem::size_of::<DrawIndirectCommand>()
    }
}

/// Solid and transparent face lists for one chunk.
#[derive(Clone, Default)]
pub struct ChunkMesh {
    pub solid: MeshData,
    pub transparent: MeshData,
}

impl ChunkMesh {
    pub fn is_empty(&self) -> bool {
        self.solid.is_empty() && self.transparent.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.solid.memory_bytes() + self.transparent.memory_bytes()
    }
}

/// Face directions: +X, -X, +Y, -Y, +Z, -Z.
const FACE_DIRS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

fn face_corners(min: Vec3, size: f32, dir: usize) -> [Vec3; 4] {
    // (offset to the face plane, two in-plane edge axes)
    let (offset, u, v) = match dir {
        0 => (Vec3::X * size, Vec3::Y, Vec3::Z),
        1 => (Vec3::ZERO, Vec3::Z, Vec3::Y),
        2 => (Vec3::Y * size, Vec3::Z, Vec3::X),
        3 => (Vec3::ZERO, Vec3::X, Vec3::Z),
        4 => (Vec3::Z * size, Vec3::X, Vec3::Y),
        _ => (Vec3::ZERO, Vec3::Y, Vec3::X),
    };
    let base = min + offset;
    [
        base,
        base + u * size,
        base + (u + v) * size,
        base + v * size,
    ]
}

fn emit_face(data: &mut MeshData, min: Vec3, size: f32, dir: usize, block: Block) {
    let corners = face_corners(min, size, dir);
    let packed = block.id() as u32 | ((dir as u32) << 8);
    for i in [0usize, 1, 2, 0, 2, 3] {
        data.vertices.push(PackedVertex {
            position: corners[i].to_array(),
            data: packed,
        });
    }
}

fn local_block(subchunks: &BTreeMap<i32, SubChunk>, lx: i32, y: i32, lz: i32) -> Block {
    if y < 0 || y >= WORLD_HEIGHT {
        return Block::Air;
    }
    subchunks
        .get(&(y / SUBCHUNK_HEIGHT))
        .map_or(Block::Air, |sub| sub.get(lx, y % SUBCHUNK_HEIGHT, lz))
}

/// Build the face lists for one chunk from a subchunk snapshot.
///
/// Cross-chunk neighbor voxels resolve through `neighbors` by coordinate, so
/// the mesher never holds a reference into another chunk. The snapshot is the
/// caller's clone; this function takes no locks.
pub fn build_chunk_mesh(
    key: ChunkKey,
    resolution: u32,
    subchunks: &BTreeMap<i32, SubChunk>,
    neighbors: &dyn BlockSource,
) -> ChunkMesh {
    let origin = key.world_origin();
    let res = resolution as i32;
    let size = res as f32;
    let mut mesh = ChunkMesh::default();

    for (&slab, sub) in subchunks {
        if sub.is_empty() {
            continue;
        }
        let solid_start = mesh.solid.vertices.len();
        let transparent_start = mesh.transparent.vertices.len();
        let base_y = slab * SUBCHUNK_HEIGHT;

        let mut ly = 0;
        while ly < SUBCHUNK_HEIGHT {
            for lz in (0..CHUNK_SIZE).step_by(res as usize) {
                for lx in (0..CHUNK_SIZE).step_by(res as usize) {
                    let block = sub.get(lx, ly, lz);
                    if block.is_air() {
                        continue;
                    }
                    let y = base_y + ly;
                    for (dir, step) in FACE_DIRS.iter().enumerate() {
                        let nx = lx + step.x * res;
                        let ny = y + step.y * res;
                        let nz = lz + step.z * res;
                        let neighbor = if (0..CHUNK_SIZE).contains(&nx)
                            && (0..CHUNK_SIZE).contains(&nz)
                        {
                            local_block(subchunks, nx, ny, nz)
                        } else {
                            neighbors.block_at(IVec3::new(origin.x + nx, ny, origin.z + nz))
                        };
                        let visible = if block.is_transparent() {
                            neighbor.is_air()
                        } else {
                            !neighbor.is_solid()
                        };
                        if visible {
                            let min = Vec3::new(
                                (origin.x + lx) as f32,
                                y as f32,
                                (origin.z + lz) as f32,
                            );
                            let pass = if block.is_transparent() {
                                &mut mesh.transparent
                            } else {
                                &mut mesh.solid
                            };
                            emit_face(pass, min, size, dir, block);
                        }
                    }
                }
            }
            ly += res;
        }

        for (data, start) in [
            (&mut mesh.solid, solid_start),
            (&mut mesh.transparent, transparent_start),
        ] {
            let added = data.vertices.len() - start;
            if added > 0 {
                data.commands.push(DrawIndirectCommand {
                    vertex_count: added as u32,
                    instance_count: 1,
                    first_vertex: start as u32,
                    first_instance: 0,
                });
            }
        }
    }

    mesh
}
