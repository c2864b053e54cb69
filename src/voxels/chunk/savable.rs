//! Plain-data snapshot of a chunk for handing off to the save and network paths.

use crate::error::CodecError;
use crate::voxels::block::{BlockId, AIR};
use crate::voxels::coordinate::ChunkCoordinate;

use super::{Chunk, ChunkMesh, Vertex, CHUNK_VOLUME};

/// A copy of the persisted fields of a [`Chunk`], detached from the live object.
#[derive(Debug, Clone, PartialEq)]
pub struct SavableChunk {
    pub coordinate: ChunkCoordinate,
    pub blocks: Vec<BlockId>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// The block data changed after `vertices`/`indices` were built.
    pub has_mesh_update: bool,
}

impl SavableChunk {
    /// Whether the snapshot carries a mesh that can be used without remeshing.
    pub fn has_valid_mesh(&self) -> bool {
        !self.has_mesh_update && (!self.indices.is_empty() || self.blocks.iter().all(|&id| id == AIR))
    }
}

impl Chunk {
    /// Copies the block array and the newest mesh buffers into a snapshot.
    ///
    /// A remesh that is staged but not yet swapped in already matches the blocks, so it
    /// is the geometry that gets saved.
    pub fn to_savable(&self) -> SavableChunk {
        let (vertices, indices) = self.mesh.latest_buffers();
        SavableChunk {
            coordinate: self.coordinate,
            blocks: self.blocks.to_vec(),
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            has_mesh_update: self.mesh.needs_update,
        }
    }

    /// Rebuilds a chunk from a snapshot.
    ///
    /// A snapshot without geometry is marked empty when all of its blocks are air. One
    /// that holds blocks but no geometry was captured before meshing and is flagged for
    /// a rebuild.
    pub fn from_savable(savable: SavableChunk) -> Result<Chunk, CodecError> {
        let count = savable.blocks.len();
        let blocks: Box<[BlockId; CHUNK_VOLUME]> = savable
            .blocks
            .into_boxed_slice()
            .try_into()
            .map_err(|_| CodecError::BlockCountMismatch(count as u32))?;

        let mut chunk = Chunk {
            coordinate: savable.coordinate,
            blocks,
            mesh: ChunkMesh::new(),
        };
        chunk.mesh.set_live(savable.vertices, savable.indices);
        if savable.has_mesh_update || (chunk.mesh.is_empty && !chunk.is_all_air()) {
            chunk.mesh.mark_dirty();
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::block::{BlockRegistry, DefaultBlock};
    use crate::voxels::chunk::{ChunkNeighborhood, MissingNeighbor};

    #[test]
    fn snapshot_round_trips_blocks_and_mesh() {
        let registry = BlockRegistry::with_default_blocks();
        let mut chunk = Chunk::new(ChunkCoordinate::new(3, -1, 2));
        chunk.set_block(1, 2, 3, DefaultBlock::DIRT.id()).unwrap();
        chunk.generate_mesh(&ChunkNeighborhood::isolated(MissingNeighbor::Air), &registry);

        let savable = chunk.to_savable();
        assert!(savable.has_valid_mesh());
        let restored = Chunk::from_savable(savable.clone()).unwrap();
        assert_eq!(restored.blocks(), chunk.blocks());
        assert_eq!(restored.mesh.vertices, chunk.mesh.vertices);
        assert_eq!(restored.mesh.indices, chunk.mesh.indices);
        assert!(!restored.mesh.needs_update);
        assert_eq!(restored.to_savable(), savable);
    }

    #[test]
    fn staged_remesh_is_what_gets_saved() {
        let registry = BlockRegistry::with_default_blocks();
        let neighborhood = ChunkNeighborhood::isolated(MissingNeighbor::Air);
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 0, 0));
        chunk.set_block(5, 5, 5, DefaultBlock::STONE.id()).unwrap();
        chunk.generate_mesh(&neighborhood, &registry);
        assert_eq!(chunk.mesh.face_count(), 6);

        chunk.set_block(5, 5, 5, AIR).unwrap();
        chunk.generate_staged_mesh(&neighborhood, &registry);
        assert_eq!(chunk.mesh.face_count(), 6);

        let savable = chunk.to_savable();
        assert!(savable.vertices.is_empty());
        assert!(savable.indices.is_empty());
        assert!(savable.has_valid_mesh());
        assert!(Chunk::from_savable(savable).unwrap().mesh.is_empty);
    }

    #[test]
    fn unmeshed_blocks_are_flagged_for_rebuild() {
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 0, 0));
        chunk.set_block(0, 0, 0, DefaultBlock::STONE.id()).unwrap();
        let savable = chunk.to_savable();
        assert!(!savable.has_valid_mesh());
        assert!(Chunk::from_savable(savable).unwrap().mesh.needs_update);

        let empty = Chunk::from_savable(Chunk::new(ChunkCoordinate::new(0, 1, 0)).to_savable())
            .unwrap();
        assert!(empty.mesh.is_empty);
        assert!(!empty.mesh.needs_update);
    }

    #[test]
    fn short_block_arrays_are_rejected() {
        let savable = SavableChunk {
            coordinate: ChunkCoordinate::new(0, 0, 0),
            blocks: vec![0; 10],
            vertices: Vec::new(),
            indices: Vec::new(),
            has_mesh_update: false,
        };
        assert!(matches!(
            Chunk::from_savable(savable),
            Err(CodecError::BlockCountMismatch(10))
        ));
    }
}
