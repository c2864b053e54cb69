//! # Error Types
//!
//! Every fallible operation in the engine returns one of the enums below. They are
//! grouped by the layer that produces them so callers can decide whether a failure
//! means "unavailable, fall back", "corrupted, discard" or "out of range, no-op".
//! Only [`NetworkError::Bind`] is treated as fatal, and only at server startup.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::voxels::coordinate::ChunkCoordinate;

/// Errors raised by chunk-local operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("local block position ({x}, {y}, {z}) is outside the chunk")]
    OutOfRange { x: i32, y: i32, z: i32 },
}

/// Errors raised while registering blocks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate block name: {0}")]
    DuplicateName(String),

    #[error("block id space exhausted")]
    Full,
}

/// Errors raised while encoding or decoding the chunk binary format.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("chunk holds {0} blocks, expected a full chunk")]
    BlockCountMismatch(u32),

    #[error("mesh index {index} points past {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: u32 },

    #[error("{0} trailing bytes after chunk data")]
    TrailingBytes(usize),

    #[error("declared size of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: usize, limit: usize },

    #[error("decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// Errors raised by the on-disk save layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted chunk file for {coordinate:?}: {source}")]
    Corrupted {
        coordinate: ChunkCoordinate,
        #[source]
        source: CodecError,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the chunk synchronisation protocol.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("handshake with {0} timed out")]
    HandshakeTimeout(SocketAddr),

    #[error("empty message")]
    EmptyMessage,

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("payload of {size} bytes exceeds the {limit} byte datagram limit")]
    Oversized { size: usize, limit: usize },

    #[error("chunk payload rejected: {0}")]
    Codec(#[from] CodecError),

    #[error("no answer for chunk {0} in time")]
    FetchTimeout(ChunkCoordinate),

    #[error("not connected")]
    NotConnected,
}

/// Errors raised by a [`MeshUploader`](crate::voxels::world::MeshUploader).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("mesh of chunk {coordinate} rejected: {reason}")]
    Rejected {
        coordinate: ChunkCoordinate,
        reason: String,
    },
}

/// Top-level error returned by [`crate::run`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
