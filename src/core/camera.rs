//! Camera state consumed by the streaming engine.
//!
//! The engine never owns a camera; the host hands it a snapshot whenever the
//! view changes. A snapshot is cheap to clone and carries an optional cached
//! frustum — selection falls back to a forward-cone test until one is set.

use glam::{Mat4, Vec3};

use crate::math::Frustum;
use crate::world::chunk::ChunkKey;

/// Immutable view state: position, forward direction, cached frustum.
#[derive(Clone, Debug)]
pub struct CameraSnapshot {
    pub position: Vec3,
    pub forward: Vec3,
    pub frustum: Option<Frustum>,
}

impl CameraSnapshot {
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward: forward.normalize_or_zero(),
            frustum: None,
        }
    }

    /// Attach a frustum extracted from a view-projection matrix.
    pub fn with_view_projection(mut self, vp: &Mat4) -> Self {
        self.frustum = Some(Frustum::from_view_projection(vp));
        self
    }

    /// Chunk the camera currently stands in.
    pub fn chunk_key(&self) -> ChunkKey {
        ChunkKey::from_world(self.position.x.floor() as i32, self.position.z.floor() as i32)
    }

    /// Forward direction projected onto the ground plane.
    pub fn planar_forward(&self) -> Vec3 {
        Vec3::new(self.forward.x, 0.0, self.forward.z).normalize_or_zero()
    }
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 80.0, 0.0), Vec3::NEG_Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::chunk::CHUNK_SIZE;

    #[test]
    fn test_chunk_key_at_origin() {
        let camera = CameraSnapshot::new(Vec3::new(1.0, 80.0, 1.0), Vec3::NEG_Z);
        assert_eq!(camera.chunk_key(), ChunkKey::new(0, 0));
    }

    #[test]
    fn test_chunk_key_negative() {
        let camera = CameraSnapshot::new(Vec3::new(-1.0, 80.0, -1.0), Vec3::NEG_Z);
        assert_eq!(camera.chunk_key(), ChunkKey::new(-1, -1));
    }

    #[test]
    fn test_chunk_key_one_chunk_over() {
        let x = CHUNK_SIZE as f32 + 0.5;
        let camera = CameraSnapshot::new(Vec3::new(x, 80.0, 0.5), Vec3::NEG_Z);
        assert_eq!(camera.chunk_key(), ChunkKey::new(1, 0));
    }

    #[test]
    fn test_planar_forward_ignores_pitch() {
        let camera = CameraSnapshot::new(Vec3::ZERO, Vec3::new(0.0, -0.9, -0.1).normalize());
        let planar = camera.planar_forward();
        assert!(planar.y.abs() < 1e-6);
        assert!((planar.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_with_view_projection_caches_frustum() {
        let vp = Mat4::perspective_rh(60f32.to_radians(), 1.6, 0.1, 1000.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 80.0, 0.0), Vec3::new(0.0, 80.0, -10.0), Vec3::Y);
        let camera = CameraSnapshot::new(Vec3::new(0.0, 80.0, 0.0), Vec3::NEG_Z)
            .with_view_projection(&vp);
        assert!(camera.frustum.is_some());
    }
}
