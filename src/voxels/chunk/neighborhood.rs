//! # Chunk Neighborhood
//!
//! A read-only view of the blocks just across each of the six faces of a chunk. The
//! meshing function takes this value instead of reaching into the world map, which keeps
//! meshing pure and lets tests build any neighbour configuration directly.
//!
//! Only the boundary layer of each neighbour is copied (16x16 ids), so the view is cheap
//! to build while the chunk map lock is held.

use serde::{Deserialize, Serialize};

use crate::voxels::block::{BlockId, BlockSide};

use super::{Chunk, CHUNK_DIMENSION};

/// Number of cells in one face layer of a chunk.
pub const LAYER_AREA: usize = (CHUNK_DIMENSION * CHUNK_DIMENSION) as usize;

/// One 16x16 slice of block ids.
pub type BoundaryLayer = Box<[BlockId; LAYER_AREA]>;

/// How faces bordering an unloaded neighbour chunk are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingNeighbor {
    /// Emit the face, as if the neighbour were air.
    #[default]
    Air,
    /// Cull the face, as if the neighbour were solid.
    Solid,
}

/// What lies across a chunk face at a given boundary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborBlock {
    Loaded(BlockId),
    Missing(MissingNeighbor),
}

/// Boundary layers of the up to six neighbours of a chunk, indexed by [`BlockSide`].
#[derive(Debug, Clone)]
pub struct ChunkNeighborhood {
    layers: [Option<BoundaryLayer>; 6],
    missing: MissingNeighbor,
}

impl ChunkNeighborhood {
    /// A neighbourhood where every neighbour is absent.
    pub fn isolated(missing: MissingNeighbor) -> Self {
        ChunkNeighborhood {
            layers: Default::default(),
            missing,
        }
    }

    /// Builds the view from the neighbour chunks, given in [`BlockSide`] order.
    pub fn from_chunks(neighbors: [Option<&Chunk>; 6], missing: MissingNeighbor) -> Self {
        let mut neighborhood = Self::isolated(missing);
        for side in BlockSide::all() {
            if let Some(chunk) = neighbors[side as usize] {
                neighborhood.set_layer(side, Self::facing_layer(chunk, side));
            }
        }
        neighborhood
    }

    /// Installs the layer seen across `side`.
    pub fn set_layer(&mut self, side: BlockSide, layer: BoundaryLayer) {
        self.layers[side as usize] = Some(layer);
    }

    pub fn has_neighbor(&self, side: BlockSide) -> bool {
        self.layers[side as usize].is_some()
    }

    pub fn missing_policy(&self) -> MissingNeighbor {
        self.missing
    }

    /// Copies the layer of `neighbor` that touches a chunk lying on its `side.opposite()`.
    ///
    /// For the neighbour across our RIGHT face this is the neighbour's `x = 0` plane.
    pub fn facing_layer(neighbor: &Chunk, side: BlockSide) -> BoundaryLayer {
        let fixed = match side {
            BlockSide::RIGHT | BlockSide::TOP | BlockSide::FRONT => 0,
            BlockSide::LEFT | BlockSide::BOTTOM | BlockSide::BACK => CHUNK_DIMENSION - 1,
        };
        let mut layer: BoundaryLayer = Box::new([0; LAYER_AREA]);
        for v in 0..CHUNK_DIMENSION {
            for u in 0..CHUNK_DIMENSION {
                let (x, y, z) = Self::unproject(side, fixed, u, v);
                layer[(u + CHUNK_DIMENSION * v) as usize] = neighbor.block_or_air(x, y, z);
            }
        }
        layer
    }

    /// Resolves the block across `side` from the boundary cell `(x, y, z)` of the chunk.
    ///
    /// The neighbour cell differs from `(x, y, z)` along the axis of `side` only; the
    /// other two coordinates carry over unchanged.
    pub fn block_across(&self, side: BlockSide, x: i32, y: i32, z: i32) -> NeighborBlock {
        match &self.layers[side as usize] {
            Some(layer) => {
                let (u, v) = Self::project(side, x, y, z);
                NeighborBlock::Loaded(layer[(u + CHUNK_DIMENSION * v) as usize])
            }
            None => NeighborBlock::Missing(self.missing),
        }
    }

    fn project(side: BlockSide, x: i32, y: i32, z: i32) -> (i32, i32) {
        match side {
            BlockSide::LEFT | BlockSide::RIGHT => (y, z),
            BlockSide::BOTTOM | BlockSide::TOP => (x, z),
            BlockSide::BACK | BlockSide::FRONT => (x, y),
        }
    }

    fn unproject(side: BlockSide, fixed: i32, u: i32, v: i32) -> (i32, i32, i32) {
        match side {
            BlockSide::LEFT | BlockSide::RIGHT => (fixed, u, v),
            BlockSide::BOTTOM | BlockSide::TOP => (u, fixed, v),
            BlockSide::BACK | BlockSide::FRONT => (u, v, fixed),
        }
    }
}
