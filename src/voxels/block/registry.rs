//! # Block Registry
//!
//! Read-only after construction, so it is shared between meshing workers behind a plain
//! `Arc` without any locking.

use std::collections::HashMap;

use crate::error::RegistryError;

use super::{BlockId, BlockSide, DefaultBlock, AIR};

/// Number of tiles per row (and per column) of the texture atlas.
pub const ATLAS_TILES_PER_ROW: u16 = 16;

/// Geometry for one face of a block, in block-local unit-cube coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceTemplate {
    pub corners: [[f32; 3]; 4],
    pub normal: [f32; 3],
    pub tex_coords: [[f32; 2]; 4],
}

impl FaceTemplate {
    /// Builds the template for `side`, textured with atlas tile `tile`.
    pub fn new(side: BlockSide, tile: u16) -> Self {
        let tile_size = 1.0 / ATLAS_TILES_PER_ROW as f32;
        let u0 = (tile % ATLAS_TILES_PER_ROW) as f32 * tile_size;
        let v0 = (tile / ATLAS_TILES_PER_ROW) as f32 * tile_size;
        let (u1, v1) = (u0 + tile_size, v0 + tile_size);

        FaceTemplate {
            corners: side.corners(),
            normal: side.normal(),
            // Matches the lower-left, upper-left, upper-right, lower-right corner order.
            tex_coords: [[u0, v1], [u0, v0], [u1, v0], [u1, v1]],
        }
    }
}

/// Properties of a registered block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    pub id: BlockId,
    pub name: String,
    pub is_solid: bool,
    pub is_transparent: bool,
    pub is_air: bool,
    /// One template per face, indexed by `BlockSide as usize`.
    pub faces: [FaceTemplate; 6],
}

impl BlockDefinition {
    fn new(id: BlockId, name: &str, is_solid: bool, is_transparent: bool, tiles: [u16; 6]) -> Self {
        let faces = BlockSide::all().map(|side| FaceTemplate::new(side, tiles[side as usize]));
        BlockDefinition {
            id,
            name: name.to_string(),
            is_solid,
            is_transparent,
            is_air: id == AIR,
            faces,
        }
    }

    pub fn face(&self, side: BlockSide) -> &FaceTemplate {
        &self.faces[side as usize]
    }
}

/// Lookup table from block id to [`BlockDefinition`] and from name to id.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: Vec<Option<BlockDefinition>>,
    by_name: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a registry holding only air.
    pub fn new() -> Self {
        let mut registry = BlockRegistry {
            blocks: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.insert(BlockDefinition::new(AIR, "air", false, true, [0; 6]));
        registry
    }

    /// Creates a registry with every [`DefaultBlock`].
    pub fn with_default_blocks() -> Self {
        let mut registry = Self::new();
        for block in DefaultBlock::all().into_iter().skip(1) {
            registry.insert(BlockDefinition::new(
                block.id(),
                block.name(),
                block.is_solid(),
                block.is_transparent(),
                block.texture_tiles(),
            ));
        }
        registry
    }

    fn insert(&mut self, definition: BlockDefinition) {
        let index = definition.id as usize;
        if self.blocks.len() <= index {
            self.blocks.resize(index + 1, None);
        }
        self.by_name.insert(definition.name.clone(), definition.id);
        self.blocks[index] = Some(definition);
    }

    /// Registers a new block under the next free id.
    ///
    /// # Arguments
    /// * `name` - Unique block name
    /// * `is_solid` - Whether entities collide with the block
    /// * `is_transparent` - Whether faces of neighbouring blocks stay visible through it
    /// * `tiles` - Atlas tile per face, in `BlockSide` order
    ///
    /// # Returns
    /// The id assigned to the block.
    pub fn register(
        &mut self,
        name: &str,
        is_solid: bool,
        is_transparent: bool,
        tiles: [u16; 6],
    ) -> Result<BlockId, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let id = BlockId::try_from(self.blocks.len()).map_err(|_| RegistryError::Full)?;
        self.insert(BlockDefinition::new(id, name, is_solid, is_transparent, tiles));
        Ok(id)
    }

    pub fn block_by_index(&self, id: BlockId) -> Option<&BlockDefinition> {
        self.blocks.get(id as usize).and_then(Option::as_ref)
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Returns `true` if a face next to `id` must be drawn: the block is air,
    /// transparent, or not registered at all.
    pub fn is_see_through(&self, id: BlockId) -> bool {
        self.block_by_index(id)
            .map_or(true, |block| block.is_air || block.is_transparent)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_default_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocks_are_registered_by_name() {
        let registry = BlockRegistry::with_default_blocks();
        assert_eq!(registry.block_by_name("stone"), Some(DefaultBlock::STONE.id()));
        assert_eq!(registry.block_by_name("grass"), Some(DefaultBlock::GRASS.id()));
        assert!(registry.block_by_index(AIR).unwrap().is_air);
        assert!(registry.block_by_index(DefaultBlock::GLASS.id()).unwrap().is_transparent);
        assert!(!registry.block_by_index(DefaultBlock::STONE.id()).unwrap().is_transparent);
    }

    #[test]
    fn unknown_ids_are_see_through() {
        let registry = BlockRegistry::with_default_blocks();
        assert!(registry.is_see_through(AIR));
        assert!(registry.is_see_through(4000));
        assert!(!registry.is_see_through(DefaultBlock::DIRT.id()));
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let mut registry = BlockRegistry::with_default_blocks();
        let id = registry.register("brick", true, false, [11; 6]).unwrap();
        assert_eq!(id, 9);
        assert!(matches!(
            registry.register("brick", true, false, [11; 6]),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn face_templates_use_the_atlas_tile() {
        let template = FaceTemplate::new(BlockSide::TOP, 17);
        let tile = 1.0 / 16.0;
        assert_eq!(template.tex_coords[1], [tile, tile]);
        assert_eq!(template.normal, [0.0, 1.0, 0.0]);
    }
}
