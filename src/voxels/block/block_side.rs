//! # Block Side Module
//!
//! This module defines the six faces of a voxel block together with the geometry
//! needed to emit a face: the neighbour offset used for culling, the outward normal
//! and the four unit-cube corners of the quad.

/// Represents the six possible faces of a voxel block.
///
/// Each variant is assigned a stable integer value so it can index per-face arrays
/// (texture tiles, neighbour layers in a [`ChunkNeighborhood`]).
///
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
///
/// [`ChunkNeighborhood`]: crate::voxels::chunk::ChunkNeighborhood
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// The front face (facing positive Z)
    FRONT = 0,

    /// The back face (facing negative Z)
    BACK = 1,

    /// The bottom face (facing negative Y)
    BOTTOM = 2,

    /// The top face (facing positive Y)
    TOP = 3,

    /// The left face (facing negative X)
    LEFT = 4,

    /// The right face (facing positive X)
    RIGHT = 5,
}

impl BlockSide {
    /// Returns an array containing all six block faces in a consistent order.
    ///
    /// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    /// Unit step from a block to the neighbour this face looks at.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            BlockSide::FRONT => (0, 0, 1),
            BlockSide::BACK => (0, 0, -1),
            BlockSide::BOTTOM => (0, -1, 0),
            BlockSide::TOP => (0, 1, 0),
            BlockSide::LEFT => (-1, 0, 0),
            BlockSide::RIGHT => (1, 0, 0),
        }
    }

    pub fn normal(self) -> [f32; 3] {
        let (x, y, z) = self.offset();
        [x as f32, y as f32, z as f32]
    }

    /// The face pointing the other way.
    pub fn opposite(self) -> BlockSide {
        match self {
            BlockSide::FRONT => BlockSide::BACK,
            BlockSide::BACK => BlockSide::FRONT,
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::LEFT => BlockSide::RIGHT,
            BlockSide::RIGHT => BlockSide::LEFT,
        }
    }

    /// Corners of the face on the unit cube, ordered lower-left, upper-left,
    /// upper-right, lower-right as seen from outside the block.
    ///
    /// Paired with the index pattern `0-2-1, 0-3-2` this yields counter-clockwise
    /// triangles when viewed from the side the normal points to.
    pub fn corners(self) -> [[f32; 3]; 4] {
        match self {
            BlockSide::FRONT => [
                [0.0, 0.0, 1.0],
                [0.0, 1.0, 1.0],
                [1.0, 1.0, 1.0],
                [1.0, 0.0, 1.0],
            ],
            BlockSide::BACK => [
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            BlockSide::BOTTOM => [
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
            ],
            BlockSide::TOP => [
                [0.0, 1.0, 1.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
                [1.0, 1.0, 1.0],
            ],
            BlockSide::LEFT => [
                [0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 1.0, 1.0],
                [0.0, 0.0, 1.0],
            ],
            BlockSide::RIGHT => [
                [1.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
                [1.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_lie_on_the_face_plane() {
        for side in BlockSide::all() {
            let normal = side.normal();
            let axis = normal.iter().position(|n| *n != 0.0).unwrap();
            let plane = if normal[axis] > 0.0 { 1.0 } else { 0.0 };
            for corner in side.corners() {
                assert_eq!(corner[axis], plane, "{:?}", side);
            }
        }
    }

    #[test]
    fn opposite_is_an_involution() {
        for side in BlockSide::all() {
            assert_eq!(side.opposite().opposite(), side);
            let (x, y, z) = side.offset();
            assert_eq!(side.opposite().offset(), (-x, -y, -z));
        }
    }
}
