//! Geometry helpers used by candidate selection

pub mod aabb;
pub mod frustum;

pub use aabb::Aabb;
pub use frustum::Frustum;
