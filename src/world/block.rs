//! Block types and the shared voxel read interface

use crate::core::types::IVec3;

/// A single voxel value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Block {
    #[default]
    Air = 0,
    Water = 1,
    Grass = 2,
    Dirt = 3,
    Sand = 4,
    Stone = 5,
    Snow = 6,
}

impl Block {
    pub fn is_air(self) -> bool {
        self == Block::Air
    }

    /// Solid blocks occlude neighboring faces and stop downward scans.
    pub fn is_solid(self) -> bool {
        !matches!(self, Block::Air | Block::Water)
    }

    /// Transparent blocks are meshed into the transparent pass.
    pub fn is_transparent(self) -> bool {
        self == Block::Water
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Read access to voxels by world position.
///
/// Implemented by the resident chunk store so the mesher can resolve
/// cross-chunk neighbors by coordinate lookup instead of stored pointers.
pub trait BlockSource {
    fn block_at(&self, pos: IVec3) -> Block;
}
