//! View frustum for candidate visibility tests

use crate::core::types::{Mat4, Vec3, Vec4};

use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    fn from_coefficients(row: Vec4) -> Self {
        let normal = Vec3::new(row.x, row.y, row.z);
        let len = normal.length();
        Self {
            normal: normal / len,
            distance: row.w / len,
        }
    }
}

/// View frustum with 6 planes (left, right, bottom, top, near, far)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    /// (Gribb-Hartmann row combinations of the transposed matrix).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let t = vp.transpose();
        let rows = [t.x_axis, t.y_axis, t.z_axis, t.w_axis];

        let planes = [
            Plane::from_coefficients(rows[3] + rows[0]), // left
            Plane::from_coefficients(rows[3] - rows[0]), // right
            Plane::from_coefficients(rows[3] + rows[1]), // bottom
            Plane::from_coefficients(rows[3] - rows[1]), // top
            Plane::from_coefficients(rows[3] + rows[2]), // near
            Plane::from_coefficients(rows[3] - rows[2]), // far
        ];

        Self { planes }
    }

    /// Check if point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if an AABB intersects the frustum (conservative p-vertex test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner most aligned with the plane normal
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look_down_neg_z(pos: Vec3) -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 500.0);
        let view = Mat4::look_at_rh(pos, pos + Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_contains_point_ahead() {
        let frustum = look_down_neg_z(Vec3::ZERO);
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
    }

    #[test]
    fn test_rejects_point_behind() {
        let frustum = look_down_neg_z(Vec3::ZERO);
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_aabb_ahead_intersects() {
        let frustum = look_down_neg_z(Vec3::ZERO);
        let aabb = Aabb::new(Vec3::new(-8.0, -8.0, -40.0), Vec3::new(8.0, 8.0, -20.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_aabb_behind_rejected() {
        let frustum = look_down_neg_z(Vec3::ZERO);
        let aabb = Aabb::new(Vec3::new(-8.0, -8.0, 20.0), Vec3::new(8.0, 8.0, 40.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_aabb_straddling_camera_intersects() {
        // A tall chunk column surrounding the camera must count as visible.
        let frustum = look_down_neg_z(Vec3::new(8.0, 80.0, 8.0));
        let aabb = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(16.0, 256.0, 16.0));
        assert!(frustum.intersects_aabb(&aabb));
    }
}
