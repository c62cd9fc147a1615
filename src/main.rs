//! Headless streaming demo: fly a camera across procedurally generated
//! terrain and report what the engine streams in along the way.

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use log::info;

use terrastream::core::camera::CameraSnapshot;
use terrastream::core::config::StreamConfig;
use terrastream::core::logging;
use terrastream::core::types::Result;
use terrastream::streaming::ChunkLoader;
use terrastream::world::{Block, NoiseSampler};

const FLIGHT_STEPS: usize = 120;
const STEP_METERS: f32 = 8.0;

fn main() -> Result<()> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };
    info!(
        "streaming demo: render distance {}, seed {}",
        config.render_distance, config.seed
    );

    let sampler = Arc::new(NoiseSampler::new(config.seed, config.terrain.clone()));
    let loader = ChunkLoader::new(config, sampler)?;
    loader.start();

    let mut position = Vec3::new(0.5, 140.0, 0.5);
    let forward = Vec3::new(0.0, -0.2, -1.0).normalize();
    let projection = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, 2000.0);

    for step in 0..FLIGHT_STEPS {
        position += forward.with_y(0.0).normalize() * STEP_METERS;
        let view = Mat4::look_to_rh(position, forward, Vec3::Y);
        loader.update_camera(CameraSnapshot::new(position, forward).with_view_projection(&(projection * view)));

        std::thread::sleep(Duration::from_millis(100));

        if let Some(pair) = loader.take_display_data() {
            info!(
                "step {step}: {} solid draws ({} verts), {} transparent draws",
                pair.solid.draw_count(),
                pair.solid.vertices.len(),
                pair.transparent.draw_count()
            );
        }
        if step % 20 == 0 {
            let ground = loader
                .find_top_block_y(position.x as i32, position.z as i32)
                .unwrap_or(-1);
            info!(
                "step {step}: {} resident / {} displayed chunks, {:.1} MiB, ground y {}",
                loader.resident_count(),
                loader.displayed_count(),
                loader.resident_bytes() as f64 / (1024.0 * 1024.0),
                ground
            );
        }
        // Carve a small mark under the flight path now and then; edits ahead
        // of the loaded ring exercise the pending queue.
        if step % 15 == 0 {
            let ahead = position + forward.with_y(0.0).normalize() * 96.0;
            let target = glam::IVec3::new(ahead.x as i32, 64, ahead.z as i32);
            let applied = loader.set_block_or_queue(target, Block::Air, true);
            info!("step {step}: edit at {target} applied now: {applied}");
        }
    }

    loader.stop();
    let stats = loader.stats();
    info!(
        "done: {} generated, {} refined, {} cache hits, {} evicted, {} edits replayed, {} display builds",
        stats.chunks_generated,
        stats.chunks_refined,
        stats.cache_hits,
        stats.chunks_evicted,
        stats.edits_replayed,
        stats.display_builds
    );
    Ok(())
}
