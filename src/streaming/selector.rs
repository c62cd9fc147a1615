//! Candidate selection: which chunk to (re)build next.
//!
//! Selection walks a square ring of offsets around the camera chunk and
//! re-scores every remaining candidate on each pick. That is O(n) per pick,
//! O(n^2) per ring, which stays cheap at practical render distances (ring
//! radii of 10-15) and keeps the ordering correct as candidates are removed
//! and the camera turns. Near, in-view chunks come first; far and
//! behind-camera chunks are deferred, so a ring interrupted by camera motion
//! still leaves reasonable coverage.

use std::cmp::Ordering;

use crate::core::camera::CameraSnapshot;
use crate::core::types::{IVec2, Vec3};
use crate::world::chunk::{ChunkKey, CHUNK_SIZE};

/// Cosine of the forward-cone half angle (~70 degrees) used for visibility
/// until a frustum has been cached.
pub const FORWARD_CONE_COS: f32 = 0.342;

/// All offsets within the square ring of the given radius.
pub fn ring_offsets(radius: i32) -> Vec<IVec2> {
    let mut offsets = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for dz in -radius..=radius {
        for dx in -radius..=radius {
            offsets.push(IVec2::new(dx, dz));
        }
    }
    offsets
}

/// Per-candidate ranking terms, evaluated fresh each pick.
#[derive(Clone, Copy, Debug)]
struct Score {
    visible: bool,
    dist_sq: f32,
    alignment: f32,
    ring: i32,
}

fn score(offset: IVec2, camera: &CameraSnapshot, origin: ChunkKey) -> Score {
    let key = origin.offset(offset.x, offset.y);
    let bounds = key.bounds();
    let center = bounds.center();
    let planar_center = Vec3::new(center.x, 0.0, center.z);
    let planar_camera = Vec3::new(camera.position.x, 0.0, camera.position.z);
    let to_chunk = planar_center - planar_camera;
    let dist_sq = to_chunk.length_squared();

    // The camera's own chunk is always "visible"; direction is meaningless
    let alignment = if offset == IVec2::ZERO {
        1.0
    } else {
        to_chunk.normalize_or_zero().dot(camera.planar_forward())
    };

    let visible = match &camera.frustum {
        Some(frustum) => offset == IVec2::ZERO || frustum.intersects_aabb(&bounds),
        None => offset == IVec2::ZERO || alignment >= FORWARD_CONE_COS,
    };

    Score {
        visible,
        dist_sq,
        alignment,
        ring: offset.x.abs().max(offset.y.abs()),
    }
}

fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// True if `a` should be processed before `b`.
fn ranks_before(a: &Score, b: &Score) -> bool {
    if a.visible != b.visible {
        return a.visible;
    }
    let order = if a.visible {
        // Visible: nearest first, then most in-line, then inner ring
        cmp_f32(a.dist_sq, b.dist_sq)
            .then(cmp_f32(b.alignment, a.alignment))
            .then(a.ring.cmp(&b.ring))
    } else {
        // Not visible: most in-line first, then nearest, then inner ring
        cmp_f32(b.alignment, a.alignment)
            .then(cmp_f32(a.dist_sq, b.dist_sq))
            .then(a.ring.cmp(&b.ring))
    };
    order == Ordering::Less
}

/// Pick the index of the best remaining candidate, or `None` when the ring
/// is exhausted. Scores are recomputed on every call because candidates are
/// removed as they are processed and the camera may have turned.
pub fn pick_next(
    remaining: &[IVec2],
    camera: &CameraSnapshot,
    origin: ChunkKey,
) -> Option<usize> {
    let mut best: Option<(usize, Score)> = None;
    for (i, &offset) in remaining.iter().enumerate() {
        let candidate = score(offset, camera, origin);
        match &best {
            Some((_, current)) if !ranks_before(&candidate, current) => {}
            _ => best = Some((i, candidate)),
        }
    }
    best.map(|(i, _)| i)
}

/// LOD stride for a ring offset: doubles every time the offset magnitude
/// crosses a doubling threshold, capped at the chunk size.
pub fn resolution_for_offset(offset: IVec2, lod_threshold: f32) -> u32 {
    let magnitude = offset.as_vec2().length();
    let mut resolution = 1u32;
    let mut threshold = lod_threshold;
    while magnitude > threshold && resolution < CHUNK_SIZE as u32 {
        resolution *= 2;
        threshold *= 2.0;
    }
    resolution
}
