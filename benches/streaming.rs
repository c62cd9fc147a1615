use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{IVec3, Vec3};

use terrastream::core::camera::CameraSnapshot;
use terrastream::streaming::{pick_next, resolution_for_offset, ring_offsets};
use terrastream::world::chunk::{Chunk, ChunkKey};
use terrastream::world::mesh::build_chunk_mesh;
use terrastream::world::{Block, BlockSource, NoiseSampler, TerrainParams};

struct NoNeighbors;

impl BlockSource for NoNeighbors {
    fn block_at(&self, _pos: IVec3) -> Block {
        Block::Air
    }
}

fn bench_ring_selection_drain(c: &mut Criterion) {
    let camera = CameraSnapshot::new(Vec3::new(8.0, 80.0, 8.0), Vec3::NEG_Z);
    let origin = ChunkKey::new(0, 0);

    c.bench_function("ring_selection_drain_r12", |b| {
        b.iter(|| {
            let mut remaining = ring_offsets(black_box(12));
            let mut picked = 0usize;
            while let Some(index) = pick_next(&remaining, &camera, origin) {
                remaining.swap_remove(index);
                picked += 1;
            }
            picked
        })
    });
}

fn bench_lod_assignment(c: &mut Criterion) {
    let offsets = ring_offsets(12);

    c.bench_function("lod_assignment_r12", |b| {
        b.iter(|| {
            offsets
                .iter()
                .map(|&offset| resolution_for_offset(black_box(offset), 2.0))
                .sum::<u32>()
        })
    });
}

fn bench_chunk_fill(c: &mut Criterion) {
    let sampler = NoiseSampler::new(12345, TerrainParams::default());

    let mut group = c.benchmark_group("chunk_fill");
    for resolution in [1u32, 4] {
        group.bench_function(format!("stride_{resolution}"), |b| {
            b.iter(|| {
                let chunk = Chunk::new(ChunkKey::new(3, -2), resolution);
                chunk.fill(black_box(&sampler)).unwrap();
                chunk.memory_bytes()
            })
        });
    }
    group.finish();
}

fn bench_mesh_build(c: &mut Criterion) {
    let sampler = NoiseSampler::new(12345, TerrainParams::default());
    let chunk = Chunk::new(ChunkKey::new(3, -2), 1);
    chunk.fill(&sampler).unwrap();
    let snapshot = chunk.subchunks_snapshot();

    c.bench_function("mesh_build_full_res", |b| {
        b.iter(|| build_chunk_mesh(chunk.key, 1, black_box(&snapshot), &NoNeighbors))
    });
}

criterion_group!(
    benches,
    bench_ring_selection_drain,
    bench_lod_assignment,
    bench_chunk_fill,
    bench_mesh_build
);
criterion_main!(benches);
