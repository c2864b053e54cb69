//! # Chunk Store
//!
//! Compressed chunk files under `<world>/chunks/`. The store is stateless apart from its
//! directory, so it is freely shared between the manager thread, the generation workers
//! and the server connection threads.
//!
//! ## File Format
//!
//! Chunk files carry the `.zst` extension of the established save layout, but their
//! content is the LZ4 frame produced by [`compress_chunk`]: a little-endian `u32`
//! decompressed size followed by an LZ4 block. They are not Zstandard frames, and
//! generic `zstd` tools cannot open them.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::trace;

use crate::error::StoreError;
use crate::voxels::chunk::SavableChunk;
use crate::voxels::coordinate::ChunkCoordinate;

use super::chunk_codec::{compress_chunk, decompress_chunk};
use super::{read_optional, write_atomic};

pub const CHUNKS_DIR: &str = "chunks";
pub const PLAYERS_DIR: &str = "players";
pub const CHUNK_FILE_EXTENSION: &str = "zst";

/// Handle to the save directory of one world.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    world_dir: PathBuf,
}

impl ChunkStore {
    /// Opens the store for `<save_root>/<world_name>`. Nothing is created until the first
    /// write.
    pub fn new(save_root: impl AsRef<Path>, world_name: &str) -> Self {
        ChunkStore {
            world_dir: save_root.as_ref().join(world_name),
        }
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.world_dir.join(CHUNKS_DIR)
    }

    pub fn players_dir(&self) -> PathBuf {
        self.world_dir.join(PLAYERS_DIR)
    }

    pub fn chunk_path(&self, coordinate: ChunkCoordinate) -> PathBuf {
        self.chunks_dir()
            .join(format!("{}.{}", coordinate.file_stem(), CHUNK_FILE_EXTENSION))
    }

    pub fn contains(&self, coordinate: ChunkCoordinate) -> bool {
        self.chunk_path(coordinate).is_file()
    }

    /// Compresses and writes a snapshot, replacing any previous file.
    pub fn save_chunk(&self, chunk: &SavableChunk) -> Result<(), StoreError> {
        self.write_chunk_file(chunk.coordinate, &compress_chunk(chunk))
    }

    /// Writes an already compressed payload after checking that it decodes.
    pub fn save_compressed(
        &self,
        coordinate: ChunkCoordinate,
        compressed: &[u8],
    ) -> Result<(), StoreError> {
        decompress_chunk(compressed, coordinate)
            .map_err(|source| StoreError::Corrupted { coordinate, source })?;
        self.write_chunk_file(coordinate, compressed)
    }

    fn write_chunk_file(&self, coordinate: ChunkCoordinate, data: &[u8]) -> Result<(), StoreError> {
        let path = self.chunk_path(coordinate);
        write_atomic(&path, data)?;
        trace!("Saved chunk {} ({} bytes)", coordinate, data.len());
        Ok(())
    }

    /// Reads the compressed payload of a chunk without decoding it.
    ///
    /// # Returns
    /// `None` if no file exists for the coordinate.
    pub fn load_compressed(&self, coordinate: ChunkCoordinate) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(read_optional(&self.chunk_path(coordinate))?)
    }

    /// Loads and decodes a chunk.
    ///
    /// # Returns
    /// `None` if no file exists, [`StoreError::Corrupted`] if the file does not decode.
    pub fn load_chunk(&self, coordinate: ChunkCoordinate) -> Result<Option<SavableChunk>, StoreError> {
        match self.load_compressed(coordinate)? {
            Some(compressed) => decompress_chunk(&compressed, coordinate)
                .map(Some)
                .map_err(|source| StoreError::Corrupted { coordinate, source }),
            None => Ok(None),
        }
    }

    /// Coordinates of every chunk file in the world.
    pub fn saved_coordinates(&self) -> Result<Vec<ChunkCoordinate>, StoreError> {
        let entries = match fs::read_dir(self.chunks_dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut coordinates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CHUNK_FILE_EXTENSION) {
                continue;
            }
            if let Some(coordinate) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(ChunkCoordinate::from_file_stem)
            {
                coordinates.push(coordinate);
            }
        }
        coordinates.sort();
        Ok(coordinates)
    }
}
