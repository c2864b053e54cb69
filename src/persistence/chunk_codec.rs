//! # Chunk Codec
//!
//! Binary format shared by the save files and the network chunk payloads. All integers
//! and floats are little-endian:
//!
//! ```text
//! [u32 blockCount][blockCount x u16 blockId]
//! [u32 vertCount][vertCount x Vertex(position: 3 x f32, normal: 3 x f32, uv: 2 x f32)]
//! [u32 indexCount][indexCount x u32 index]
//! ```
//!
//! The buffer is compressed as a whole with LZ4. The compressed frame starts with the
//! decompressed size so the decoder can allocate once.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::CodecError;
use crate::voxels::block::BlockId;
use crate::voxels::chunk::{SavableChunk, Vertex, CHUNK_VOLUME};
use crate::voxels::coordinate::ChunkCoordinate;

/// Upper bound on the decompressed size of one chunk. A chunk where every other cell is
/// solid and fully exposed stays well below this.
pub const MAX_RAW_CHUNK_BYTES: usize = 8 * 1024 * 1024;

const FLOATS_PER_VERTEX: usize = 8;

/// Serialises a snapshot into the uncompressed layout.
///
/// A snapshot flagged with `has_mesh_update` is written without geometry: its buffers
/// no longer match the blocks, and the reader rebuilds a mesh for any chunk that holds
/// blocks but no geometry.
pub fn encode_raw(chunk: &SavableChunk) -> Vec<u8> {
    let (vertices, indices) = if chunk.has_mesh_update {
        (&chunk.vertices[..0], &chunk.indices[..0])
    } else {
        (chunk.vertices.as_slice(), chunk.indices.as_slice())
    };
    let capacity = 12 + chunk.blocks.len() * 2 + vertices.len() * Vertex::SIZE + indices.len() * 4;
    let mut buffer = Vec::with_capacity(capacity);

    buffer.extend_from_slice(&(chunk.blocks.len() as u32).to_le_bytes());
    for id in &chunk.blocks {
        buffer.extend_from_slice(&id.to_le_bytes());
    }

    buffer.extend_from_slice(&(vertices.len() as u32).to_le_bytes());
    for vertex in vertices {
        let floats = vertex
            .position
            .iter()
            .chain(vertex.normal.iter())
            .chain(vertex.tex_coord.iter());
        for value in floats {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }

    buffer.extend_from_slice(&(indices.len() as u32).to_le_bytes());
    for index in indices {
        buffer.extend_from_slice(&index.to_le_bytes());
    }

    buffer
}

/// Parses the uncompressed layout. The coordinate is not part of the format and is
/// supplied by the caller (file name or message header).
pub fn decode_raw(bytes: &[u8], coordinate: ChunkCoordinate) -> Result<SavableChunk, CodecError> {
    let mut reader = ByteReader::new(bytes);

    let block_count = reader.read_u32()?;
    if block_count as usize != CHUNK_VOLUME {
        return Err(CodecError::BlockCountMismatch(block_count));
    }
    let block_bytes = reader.take(CHUNK_VOLUME * 2)?;
    let blocks: Vec<BlockId> = block_bytes
        .chunks_exact(2)
        .map(|pair| BlockId::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let vertex_count = reader.read_u32()?;
    let vertex_bytes = reader.take(checked_len(vertex_count, Vertex::SIZE, &reader)?)?;
    let vertices = vertex_bytes
        .chunks_exact(Vertex::SIZE)
        .map(|raw| {
            let mut floats = [0.0f32; FLOATS_PER_VERTEX];
            for (value, bytes) in floats.iter_mut().zip(raw.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            Vertex::new(
                [floats[0], floats[1], floats[2]],
                [floats[3], floats[4], floats[5]],
                [floats[6], floats[7]],
            )
        })
        .collect();

    let index_count = reader.read_u32()?;
    let index_bytes = reader.take(checked_len(index_count, 4, &reader)?)?;
    let mut indices = Vec::with_capacity(index_count as usize);
    for raw in index_bytes.chunks_exact(4) {
        let index = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if index >= vertex_count {
            return Err(CodecError::IndexOutOfBounds {
                index,
                vertex_count,
            });
        }
        indices.push(index);
    }

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }

    Ok(SavableChunk {
        coordinate,
        blocks,
        vertices,
        indices,
        has_mesh_update: false,
    })
}

/// Encodes and compresses a snapshot.
pub fn compress_chunk(chunk: &SavableChunk) -> Vec<u8> {
    compress_prepend_size(&encode_raw(chunk))
}

/// Decompresses and decodes a snapshot.
///
/// The declared size is checked against [`MAX_RAW_CHUNK_BYTES`] before anything is
/// allocated.
pub fn decompress_chunk(
    bytes: &[u8],
    coordinate: ChunkCoordinate,
) -> Result<SavableChunk, CodecError> {
    let mut reader = ByteReader::new(bytes);
    let declared = reader.read_u32()? as usize;
    if declared > MAX_RAW_CHUNK_BYTES {
        return Err(CodecError::Oversized {
            size: declared,
            limit: MAX_RAW_CHUNK_BYTES,
        });
    }
    let raw = decompress_size_prepended(bytes)?;
    decode_raw(&raw, coordinate)
}

fn checked_len(count: u32, item_size: usize, reader: &ByteReader<'_>) -> Result<usize, CodecError> {
    (count as usize)
        .checked_mul(item_size)
        .ok_or(CodecError::Truncated {
            offset: reader.offset,
            needed: usize::MAX,
            available: reader.remaining(),
        })
}

/// Bounds-checked little-endian cursor over a byte slice.
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::block::{BlockRegistry, DefaultBlock};
    use crate::voxels::chunk::{Chunk, ChunkNeighborhood, MissingNeighbor};
    use crate::voxels::terrain::FlatTerrain;

    fn coordinate() -> ChunkCoordinate {
        ChunkCoordinate::new(4, 2, -9)
    }

    fn meshed(mut chunk: Chunk) -> SavableChunk {
        let registry = BlockRegistry::with_default_blocks();
        chunk.generate_mesh(&ChunkNeighborhood::isolated(MissingNeighbor::Air), &registry);
        chunk.to_savable()
    }

    fn assert_round_trip(savable: &SavableChunk) {
        let decoded = decompress_chunk(&compress_chunk(savable), savable.coordinate).unwrap();
        assert_eq!(decoded.blocks, savable.blocks);
        assert_eq!(
            bytemuck::cast_slice::<Vertex, u8>(&decoded.vertices),
            bytemuck::cast_slice::<Vertex, u8>(&savable.vertices)
        );
        assert_eq!(decoded.indices, savable.indices);
    }

    #[test]
    fn empty_chunk_round_trips() {
        let savable = Chunk::new(coordinate()).to_savable();
        assert_round_trip(&savable);
        assert_eq!(encode_raw(&savable).len(), 12 + CHUNK_VOLUME * 2);
    }

    #[test]
    fn partial_terrain_chunk_round_trips_with_mesh() {
        let mut chunk = Chunk::new(ChunkCoordinate::new(0, 3, 0));
        chunk.generate_terrain(&FlatTerrain::new(55.0), &BlockRegistry::with_default_blocks());
        let savable = meshed(chunk);
        assert!(!savable.indices.is_empty());
        assert_round_trip(&savable);
    }

    #[test]
    fn full_chunk_round_trips() {
        let savable = meshed(Chunk::filled(coordinate(), DefaultBlock::STONE.id()));
        assert_eq!(savable.vertices.len(), 6 * 256 * 4);
        assert_round_trip(&savable);
    }

    #[test]
    fn layout_is_little_endian() {
        let mut chunk = Chunk::new(coordinate());
        chunk.set_block(0, 0, 0, 0x0102).unwrap();
        let raw = encode_raw(&chunk.to_savable());
        assert_eq!(&raw[..4], &(CHUNK_VOLUME as u32).to_le_bytes());
        assert_eq!(&raw[4..6], &[0x02, 0x01]);
    }

    #[test]
    fn stale_geometry_is_not_written() {
        let mut chunk = Chunk::filled(coordinate(), DefaultBlock::DIRT.id());
        chunk.generate_mesh(
            &ChunkNeighborhood::isolated(MissingNeighbor::Air),
            &BlockRegistry::with_default_blocks(),
        );
        chunk.set_block(0, 0, 0, DefaultBlock::STONE.id()).unwrap();

        let savable = chunk.to_savable();
        assert!(savable.has_mesh_update && !savable.vertices.is_empty());
        let decoded = decompress_chunk(&compress_chunk(&savable), coordinate()).unwrap();
        assert!(decoded.vertices.is_empty() && decoded.indices.is_empty());
        assert!(Chunk::from_savable(decoded).unwrap().mesh.needs_update);
    }

    #[test]
    fn corrupted_input_is_rejected() {
        let compressed = compress_chunk(&meshed(Chunk::filled(coordinate(), 1)));

        assert!(decompress_chunk(&compressed[..compressed.len() / 2], coordinate()).is_err());
        assert!(decompress_chunk(&[1, 2], coordinate()).is_err());
        assert!(matches!(
            decompress_chunk(&[0xff, 0xff, 0xff, 0x7f, 0], coordinate()),
            Err(CodecError::Oversized { .. })
        ));
    }

    #[test]
    fn structural_errors_are_reported() {
        let savable = meshed(Chunk::filled(coordinate(), 1));

        let mut raw = encode_raw(&savable);
        raw.push(0);
        assert!(matches!(
            decode_raw(&raw, coordinate()),
            Err(CodecError::TrailingBytes(1))
        ));

        let mut bad_index = savable.clone();
        bad_index.indices[0] = bad_index.vertices.len() as u32;
        assert!(matches!(
            decode_raw(&encode_raw(&bad_index), coordinate()),
            Err(CodecError::IndexOutOfBounds { .. })
        ));

        let mut short = savable;
        short.blocks.truncate(100);
        assert!(matches!(
            decode_raw(&encode_raw(&short), coordinate()),
            Err(CodecError::BlockCountMismatch(100))
        ));
    }
}
