//! # Block Module
//!
//! This module provides the block vocabulary shared by terrain fill, meshing and the
//! wire format. Chunks store nothing but a [`BlockId`] per cell; everything else
//! (solidity, transparency, face geometry) is looked up in the [`BlockRegistry`].

pub mod block_side;
pub mod registry;

use num_derive::FromPrimitive;

pub use block_side::BlockSide;
pub use registry::{BlockDefinition, BlockRegistry, FaceTemplate};

/// The underlying integer type used to store a block in a chunk cell.
pub type BlockId = u16;

/// Id of the air block. A chunk that contains only air has no mesh.
pub const AIR: BlockId = 0;

/// Blocks registered by [`BlockRegistry::with_default_blocks`].
///
/// The discriminant is the block id, and the `FromPrimitive` derive lets decoded ids be
/// mapped back to a known block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum DefaultBlock {
    AIR = 0,
    STONE = 1,
    DIRT = 2,
    GRASS = 3,
    SAND = 4,
    WATER = 5,
    WOOD = 6,
    LEAVES = 7,
    GLASS = 8,
}

impl DefaultBlock {
    pub fn all() -> [DefaultBlock; 9] {
        [
            DefaultBlock::AIR,
            DefaultBlock::STONE,
            DefaultBlock::DIRT,
            DefaultBlock::GRASS,
            DefaultBlock::SAND,
            DefaultBlock::WATER,
            DefaultBlock::WOOD,
            DefaultBlock::LEAVES,
            DefaultBlock::GLASS,
        ]
    }

    pub fn id(self) -> BlockId {
        self as BlockId
    }

    pub fn from_id(id: BlockId) -> Option<Self> {
        num_traits::FromPrimitive::from_u16(id)
    }

    /// Registry name of the block.
    pub fn name(self) -> &'static str {
        match self {
            DefaultBlock::AIR => "air",
            DefaultBlock::STONE => "stone",
            DefaultBlock::DIRT => "dirt",
            DefaultBlock::GRASS => "grass",
            DefaultBlock::SAND => "sand",
            DefaultBlock::WATER => "water",
            DefaultBlock::WOOD => "wood",
            DefaultBlock::LEAVES => "leaves",
            DefaultBlock::GLASS => "glass",
        }
    }

    /// Atlas tile for each face, in `BlockSide` order:
    /// [Front, Back, Bottom, Top, Left, Right]
    pub fn texture_tiles(self) -> [u16; 6] {
        match self {
            DefaultBlock::AIR => [0; 6],
            DefaultBlock::STONE => [1; 6],
            DefaultBlock::DIRT => [2; 6],
            DefaultBlock::GRASS => [3, 3, 2, 4, 3, 3],
            DefaultBlock::SAND => [5; 6],
            DefaultBlock::WATER => [6; 6],
            DefaultBlock::WOOD => [7, 7, 8, 8, 7, 7],
            DefaultBlock::LEAVES => [9; 6],
            DefaultBlock::GLASS => [10; 6],
        }
    }

    fn is_transparent(self) -> bool {
        matches!(
            self,
            DefaultBlock::AIR | DefaultBlock::WATER | DefaultBlock::LEAVES | DefaultBlock::GLASS
        )
    }

    fn is_solid(self) -> bool {
        !matches!(self, DefaultBlock::AIR | DefaultBlock::WATER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_map_back_to_blocks() {
        for block in DefaultBlock::all() {
            assert_eq!(DefaultBlock::from_id(block.id()), Some(block));
        }
        assert_eq!(DefaultBlock::from_id(999), None);
    }
}
