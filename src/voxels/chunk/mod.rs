//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a 16x16x16 grid of block ids together with
//! the mesh derived from it. All algorithms here are local to one chunk; anything that
//! needs neighbour data receives it through a [`ChunkNeighborhood`].
//!
//! ## Storage
//!
//! Blocks are stored densely, one [`BlockId`] per cell, in row-major order
//! (x, then y, then z):
//!
//! ```text
//! index = x + CHUNK_DIMENSION * y + CHUNK_PLANE_SIZE * z
//! ```
//!
//! A dense layout keeps lookups O(1) and lets the save codec write the array as is.
//!
//! ## Meshing
//!
//! Meshing is naive face culling: every face of a non-air block is emitted when the cell
//! across it is see-through (air, transparent or an unknown id). Faces on the chunk
//! boundary consult the neighbourhood view, whose missing-neighbour policy decides what
//! an unloaded neighbour counts as.

use cgmath::Point3;

use crate::error::ChunkError;
use crate::voxels::block::{BlockId, BlockRegistry, BlockSide, DefaultBlock, AIR};
use crate::voxels::coordinate::ChunkCoordinate;
use crate::voxels::terrain::{BiomeId, TerrainSource};

pub mod mesh;
pub mod neighborhood;
pub mod savable;

pub use mesh::{ChunkMesh, MeshHandle, Vertex};
pub use neighborhood::{ChunkNeighborhood, MissingNeighbor, NeighborBlock};
pub use savable::SavableChunk;

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_VOLUME: usize = (CHUNK_PLANE_SIZE * CHUNK_DIMENSION) as usize;

/// Depth below the surface down to which the subsurface block is used.
pub const SUBSURFACE_DEPTH: i32 = 3;

/// Returned by [`Chunk::block_id_or_sentinel`] for positions outside the chunk.
pub const OUT_OF_RANGE_SENTINEL: i32 = -1;

/// Triangle pattern of one quad, relative to its first vertex.
const QUAD_INDICES: [u32; 6] = [0, 2, 1, 0, 3, 2];

/// Represents a 16x16x16 collection of voxel blocks in the world.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    pub coordinate: ChunkCoordinate,
    blocks: Box<[BlockId; CHUNK_VOLUME]>,
    pub mesh: ChunkMesh,
}

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    pub fn new(coordinate: ChunkCoordinate) -> Self {
        Chunk {
            coordinate,
            blocks: Box::new([AIR; CHUNK_VOLUME]),
            mesh: ChunkMesh::new(),
        }
    }

    /// Creates a chunk from a full block array. The mesh is left dirty unless the chunk
    /// is all air.
    pub fn from_blocks(coordinate: ChunkCoordinate, blocks: Box<[BlockId; CHUNK_VOLUME]>) -> Self {
        let mut chunk = Chunk {
            coordinate,
            blocks,
            mesh: ChunkMesh::new(),
        };
        if !chunk.is_all_air() {
            chunk.mesh.mark_dirty();
        }
        chunk
    }

    /// Creates a chunk filled with a single block.
    pub fn filled(coordinate: ChunkCoordinate, id: BlockId) -> Self {
        Self::from_blocks(coordinate, Box::new([id; CHUNK_VOLUME]))
    }

    /// Maps chunk-relative coordinates to an index into the block array.
    ///
    /// # Returns
    /// `None` unless `0 <= x, y, z < CHUNK_DIMENSION`.
    pub fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        let range = 0..CHUNK_DIMENSION;
        if range.contains(&x) && range.contains(&y) && range.contains(&z) {
            Some((x + CHUNK_DIMENSION * y + CHUNK_PLANE_SIZE * z) as usize)
        } else {
            None
        }
    }

    /// Inverse of [`Chunk::index`].
    pub fn position_of(index: usize) -> (i32, i32, i32) {
        let index = index as i32;
        (
            index % CHUNK_DIMENSION,
            (index / CHUNK_DIMENSION) % CHUNK_DIMENSION,
            index / CHUNK_PLANE_SIZE,
        )
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<BlockId, ChunkError> {
        Self::index(x, y, z)
            .map(|index| self.blocks[index])
            .ok_or(ChunkError::OutOfRange { x, y, z })
    }

    /// Block id at `(x, y, z)`, or [`OUT_OF_RANGE_SENTINEL`] outside the chunk.
    pub fn block_id_or_sentinel(&self, x: i32, y: i32, z: i32) -> i32 {
        self.get_block(x, y, z)
            .map_or(OUT_OF_RANGE_SENTINEL, i32::from)
    }

    fn block_or_air(&self, x: i32, y: i32, z: i32) -> BlockId {
        self.get_block(x, y, z).unwrap_or(AIR)
    }

    /// Writes one block and flags the mesh for rebuilding.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Result<(), ChunkError> {
        let index = Self::index(x, y, z).ok_or(ChunkError::OutOfRange { x, y, z })?;
        self.blocks[index] = id;
        self.mesh.mark_dirty();
        Ok(())
    }

    pub fn blocks(&self) -> &[BlockId; CHUNK_VOLUME] {
        &self.blocks
    }

    /// Replaces the whole block array and flags the mesh for rebuilding.
    pub fn replace_blocks(&mut self, blocks: Box<[BlockId; CHUNK_VOLUME]>) {
        self.blocks = blocks;
        if self.is_all_air() {
            self.mesh.mark_empty();
        } else {
            self.mesh.mark_dirty();
        }
    }

    pub fn is_all_air(&self) -> bool {
        self.blocks.iter().all(|&id| id == AIR)
    }

    /// World-space position of the chunk's minimum corner, in blocks.
    pub fn world_origin(&self) -> Point3<i32> {
        self.coordinate.world_origin()
    }

    /// Fills every cell from the terrain surface.
    ///
    /// Per column, with `h` the surface height:
    /// - `world_y > h`: air
    /// - `world_y == h`: grass (sand in deserts)
    /// - `h - 3 <= world_y < h`: dirt (sand in deserts)
    /// - `world_y < h - 3`: stone
    ///
    /// Columns are sampled once up front; if no column reaches the chunk's lowest layer
    /// the chunk is left as air without touching the block array.
    ///
    /// # Arguments
    /// * `terrain` - Height and biome source
    /// * `registry` - Resolves the surface block names to ids
    pub fn generate_terrain(&mut self, terrain: &dyn TerrainSource, registry: &BlockRegistry) {
        let origin = self.world_origin();
        let mut columns = [(0i32, BiomeId::Plains); LAYER_COLUMNS];
        let mut highest = i32::MIN;
        for z in 0..CHUNK_DIMENSION {
            for x in 0..CHUNK_DIMENSION {
                let (world_x, world_z) = (origin.x + x, origin.z + z);
                let height = terrain.height_at(world_x, world_z).floor() as i32;
                highest = highest.max(height);
                columns[(x + CHUNK_DIMENSION * z) as usize] =
                    (height, terrain.biome_at(world_x, world_z));
            }
        }

        if highest < origin.y {
            self.blocks.fill(AIR);
            self.mesh.mark_empty();
            return;
        }

        let lookup = |block: DefaultBlock| registry.block_by_name(block.name()).unwrap_or(block.id());
        let (stone, dirt, grass, sand) = (
            lookup(DefaultBlock::STONE),
            lookup(DefaultBlock::DIRT),
            lookup(DefaultBlock::GRASS),
            lookup(DefaultBlock::SAND),
        );

        for z in 0..CHUNK_DIMENSION {
            for x in 0..CHUNK_DIMENSION {
                let (height, biome) = columns[(x + CHUNK_DIMENSION * z) as usize];
                let (surface, subsurface) = match biome {
                    BiomeId::Desert => (sand, sand),
                    BiomeId::Plains | BiomeId::Mountains => (grass, dirt),
                };
                for y in 0..CHUNK_DIMENSION {
                    let world_y = origin.y + y;
                    let id = if world_y > height {
                        AIR
                    } else if world_y == height {
                        surface
                    } else if world_y >= height - SUBSURFACE_DEPTH {
                        subsurface
                    } else {
                        stone
                    };
                    self.blocks[(x + CHUNK_DIMENSION * y + CHUNK_PLANE_SIZE * z) as usize] = id;
                }
            }
        }

        if self.is_all_air() {
            self.mesh.mark_empty();
        } else {
            self.mesh.mark_dirty();
        }
    }

    /// Builds the culled mesh of this chunk without modifying it.
    ///
    /// Vertex positions are the face template corners offset by the cell position and
    /// the world-space chunk origin. Each face adds 4 vertices and the triangles
    /// `0-2-1, 0-3-2`.
    ///
    /// # Returns
    /// The vertex and index buffers.
    pub fn build_mesh(
        &self,
        neighborhood: &ChunkNeighborhood,
        registry: &BlockRegistry,
    ) -> (Vec<Vertex>, Vec<u32>) {
        let origin = self.world_origin();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for (index, &id) in self.blocks.iter().enumerate() {
            if id == AIR {
                continue;
            }
            let Some(block) = registry.block_by_index(id) else {
                continue;
            };
            let (x, y, z) = Self::position_of(index);

            for side in BlockSide::all() {
                if !self.face_visible(side, x, y, z, neighborhood, registry) {
                    continue;
                }

                let face = block.face(side);
                let base = vertices.len() as u32;
                for (corner, tex_coord) in face.corners.iter().zip(face.tex_coords) {
                    vertices.push(Vertex::new(
                        [
                            corner[0] + (origin.x + x) as f32,
                            corner[1] + (origin.y + y) as f32,
                            corner[2] + (origin.z + z) as f32,
                        ],
                        face.normal,
                        tex_coord,
                    ));
                }
                indices.extend(QUAD_INDICES.iter().map(|offset| base + offset));
            }
        }

        (vertices, indices)
    }

    fn face_visible(
        &self,
        side: BlockSide,
        x: i32,
        y: i32,
        z: i32,
        neighborhood: &ChunkNeighborhood,
        registry: &BlockRegistry,
    ) -> bool {
        let (dx, dy, dz) = side.offset();
        match Self::index(x + dx, y + dy, z + dz) {
            Some(index) => registry.is_see_through(self.blocks[index]),
            None => match neighborhood.block_across(side, x, y, z) {
                NeighborBlock::Loaded(id) => registry.is_see_through(id),
                NeighborBlock::Missing(MissingNeighbor::Air) => true,
                NeighborBlock::Missing(MissingNeighbor::Solid) => false,
            },
        }
    }

    /// Meshes the chunk into its live buffers. Used for the first mesh of a chunk.
    pub fn generate_mesh(&mut self, neighborhood: &ChunkNeighborhood, registry: &BlockRegistry) {
        let (vertices, indices) = self.build_mesh(neighborhood, registry);
        self.mesh.set_live(vertices, indices);
    }

    /// Meshes a resident chunk into its staging buffers.
    pub fn generate_staged_mesh(
        &mut self,
        neighborhood: &ChunkNeighborhood,
        registry: &BlockRegistry,
    ) {
        let (vertices, indices) = self.build_mesh(neighborhood, registry);
        self.mesh.set_staged(vertices, indices);
    }
}

const LAYER_COLUMNS: usize = (CHUNK_DIMENSION * CHUNK_DIMENSION) as usize;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::terrain::FlatTerrain;

    fn registry() -> BlockRegistry {
        BlockRegistry::with_default_blocks()
    }

    fn stone() -> BlockId {
        DefaultBlock::STONE.id()
    }

    fn opaque_neighborhood() -> ChunkNeighborhood {
        let solid = Chunk::filled(ChunkCoordinate::new(9, 9, 9), stone());
        ChunkNeighborhood::from_chunks([Some(&solid); 6], MissingNeighbor::Air)
    }

    fn air_neighborhood() -> ChunkNeighborhood {
        let air = Chunk::new(ChunkCoordinate::new(9, 9, 9));
        ChunkNeighborhood::from_chunks([Some(&air); 6], MissingNeighbor::Solid)
    }

    /// Faces in `vertices` whose normal is `normal`.
    fn faces_with_normal(vertices: &[Vertex], normal: [f32; 3]) -> usize {
        vertices.iter().filter(|v| v.normal == normal).count() / 4
    }

    #[test]
    fn index_is_a_bijection() {
        let mut seen = vec![false; CHUNK_VOLUME];
        for z in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    let index = Chunk::index(x, y, z).unwrap();
                    assert!(!seen[index]);
                    seen[index] = true;
                    assert_eq!(Chunk::position_of(index), (x, y, z));
                }
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn out_of_range_access_is_reported() {
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 0, 0));
        for (x, y, z) in [(-1, 0, 0), (16, 0, 0), (0, -1, 0), (0, 16, 0), (0, 0, 16)] {
            assert_eq!(Chunk::index(x, y, z), None);
            assert_eq!(chunk.block_id_or_sentinel(x, y, z), OUT_OF_RANGE_SENTINEL);
            assert_eq!(
                chunk.set_block(x, y, z, stone()),
                Err(ChunkError::OutOfRange { x, y, z })
            );
        }
        assert_eq!(chunk.block_id_or_sentinel(15, 15, 15), 0);
    }

    #[test]
    fn flat_terrain_layers_match_surface_height() {
        let registry = registry();
        let terrain = FlatTerrain::new(64.0);
        for chunk_y in [3, 4] {
            let mut chunk = Chunk::new(ChunkCoordinate::new(0, chunk_y, 0));
            chunk.generate_terrain(&terrain, &registry);
            for y in 0..CHUNK_DIMENSION {
                let world_y = chunk_y * CHUNK_DIMENSION + y;
                let expected = match world_y {
                    w if w < 61 => DefaultBlock::STONE,
                    61..=63 => DefaultBlock::DIRT,
                    64 => DefaultBlock::GRASS,
                    _ => DefaultBlock::AIR,
                };
                assert_eq!(chunk.get_block(7, y, 3).unwrap(), expected.id(), "y = {}", world_y);
            }
        }
    }

    #[test]
    fn chunks_above_the_surface_are_fast_empty() {
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 5, 0));
        chunk.generate_terrain(&FlatTerrain::new(64.0), &registry());
        assert!(chunk.is_all_air());
        assert!(chunk.mesh.is_empty);
        assert!(!chunk.mesh.needs_update);
    }

    #[test]
    fn surface_chunk_mesh_has_top_faces_only_when_buried_sideways() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 4, 0));
        chunk.generate_terrain(&FlatTerrain::new(64.0), &registry);

        // Horizontal neighbours are identical terrain; below is solid; above is air.
        let mut neighborhood = ChunkNeighborhood::isolated(MissingNeighbor::Solid);
        neighborhood.set_layer(BlockSide::TOP, ChunkNeighborhood::facing_layer(
            &Chunk::new(ChunkCoordinate::new(0, 5, 0)),
            BlockSide::TOP,
        ));
        for side in [BlockSide::LEFT, BlockSide::RIGHT, BlockSide::FRONT, BlockSide::BACK] {
            neighborhood.set_layer(side, ChunkNeighborhood::facing_layer(&chunk, side));
        }

        chunk.generate_mesh(&neighborhood, &registry);
        assert!(!chunk.mesh.is_empty);
        assert_eq!(chunk.mesh.face_count(), 256);
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [0.0, 1.0, 0.0]), 256);
        assert!(chunk.mesh.vertices.iter().all(|v| v.position[1] == 65.0));
    }

    #[test]
    fn exposed_sides_are_meshed_with_air_neighbors() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 4, 0));
        chunk.generate_terrain(&FlatTerrain::new(64.0), &registry);
        chunk.generate_mesh(&ChunkNeighborhood::isolated(MissingNeighbor::Air), &registry);

        // Terrain occupies world y 64..=64 of this chunk only (y = 0).
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [0.0, 1.0, 0.0]), 256);
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [0.0, -1.0, 0.0]), 256);
        for normal in [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, -1.0]] {
            assert_eq!(faces_with_normal(&chunk.mesh.vertices, normal), 16);
        }
    }

    #[test]
    fn opaque_neighbors_hide_every_boundary_face() {
        let registry = registry();
        let mut chunk = Chunk::filled(ChunkCoordinate::new(0, 0, 0), stone());
        chunk.generate_mesh(&opaque_neighborhood(), &registry);
        assert!(chunk.mesh.is_empty);
        assert_eq!(chunk.mesh.face_count(), 0);
    }

    #[test]
    fn air_neighbors_expose_every_boundary_face() {
        let registry = registry();
        let mut chunk = Chunk::filled(ChunkCoordinate::new(0, 0, 0), stone());
        chunk.generate_mesh(&air_neighborhood(), &registry);
        assert_eq!(chunk.mesh.face_count(), 6 * 256);
        for side in BlockSide::all() {
            assert_eq!(faces_with_normal(&chunk.mesh.vertices, side.normal()), 256);
        }
    }

    #[test]
    fn each_boundary_direction_is_resolved_independently() {
        let registry = registry();
        let mut chunk = Chunk::filled(ChunkCoordinate::new(0, 0, 0), stone());
        let solid = Chunk::filled(ChunkCoordinate::new(9, 9, 9), stone());
        for open in BlockSide::all() {
            let mut neighbors = [Some(&solid); 6];
            neighbors[open as usize] = None;
            let neighborhood = ChunkNeighborhood::from_chunks(neighbors, MissingNeighbor::Air);
            chunk.generate_mesh(&neighborhood, &registry);
            assert_eq!(chunk.mesh.face_count(), 256, "{:?}", open);
            assert_eq!(faces_with_normal(&chunk.mesh.vertices, open.normal()), 256);
        }
    }

    #[test]
    fn corner_cell_resolves_each_crossing_through_its_straight_neighbor() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 0, 0));
        chunk.set_block(15, 15, 15, stone()).unwrap();

        let solid = Chunk::filled(ChunkCoordinate::new(9, 9, 9), stone());
        let mut neighbors: [Option<&Chunk>; 6] = [None; 6];
        neighbors[BlockSide::RIGHT as usize] = Some(&solid);
        neighbors[BlockSide::TOP as usize] = Some(&solid);
        let neighborhood = ChunkNeighborhood::from_chunks(neighbors, MissingNeighbor::Air);

        chunk.generate_mesh(&neighborhood, &registry);
        // RIGHT and TOP are covered, FRONT crosses into a missing chunk, the rest face air.
        assert_eq!(chunk.mesh.face_count(), 4);
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [1.0, 0.0, 0.0]), 0);
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [0.0, 1.0, 0.0]), 0);
        assert_eq!(faces_with_normal(&chunk.mesh.vertices, [0.0, 0.0, 1.0]), 1);
    }

    #[test]
    fn transparent_neighbors_keep_faces() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 0, 0));
        chunk.set_block(5, 5, 5, stone()).unwrap();
        for (dx, dy, dz) in BlockSide::all().map(BlockSide::offset) {
            chunk
                .set_block(5 + dx, 5 + dy, 5 + dz, DefaultBlock::GLASS.id())
                .unwrap();
        }
        let (vertices, _) = chunk.build_mesh(&opaque_neighborhood(), &registry);
        // Stone keeps 6 faces; every glass cube shows 6 faces except the one against stone.
        assert_eq!(vertices.len() / 4, 6 + 6 * 5);
    }

    #[test]
    fn meshing_is_idempotent() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(-2, 3, 7));
        chunk.generate_terrain(&FlatTerrain::new(60.0), &registry);
        chunk.set_block(3, 13, 3, DefaultBlock::WOOD.id()).unwrap();
        let neighborhood = ChunkNeighborhood::isolated(MissingNeighbor::Air);

        let (first_vertices, first_indices) = chunk.build_mesh(&neighborhood, &registry);
        let (second_vertices, second_indices) = chunk.build_mesh(&neighborhood, &registry);
        assert_eq!(
            bytemuck::cast_slice::<Vertex, u8>(&first_vertices),
            bytemuck::cast_slice::<Vertex, u8>(&second_vertices)
        );
        assert_eq!(first_indices, second_indices);
    }

    #[test]
    fn quads_use_the_fixed_winding() {
        let registry = registry();
        let mut chunk = Chunk::new(ChunkCoordinate::new(1, 0, 0));
        chunk.set_block(0, 0, 0, stone()).unwrap();
        let (vertices, indices) = chunk.build_mesh(&air_neighborhood(), &registry);
        assert_eq!(vertices.len(), 24);
        assert_eq!(&indices[..12], &[0, 2, 1, 0, 3, 2, 4, 6, 5, 4, 7, 6]);
        // Offset by the world-space origin of chunk (1, 0, 0).
        assert!(vertices.iter().all(|v| (16.0..=17.0).contains(&v.position[0])));
    }

    #[test]
    fn edits_dirty_the_mesh() {
        let registry = registry();
        let mut chunk = Chunk::filled(ChunkCoordinate::new(0, 0, 0), stone());
        chunk.generate_mesh(&opaque_neighborhood(), &registry);
        assert!(!chunk.mesh.needs_update);

        chunk.set_block(8, 8, 8, AIR).unwrap();
        assert!(chunk.mesh.needs_update);
        chunk.generate_staged_mesh(&opaque_neighborhood(), &registry);
        assert_eq!(chunk.mesh.face_count(), 0);
        assert!(chunk.mesh.swap_staged());
        assert_eq!(chunk.mesh.face_count(), 6);
    }
}
