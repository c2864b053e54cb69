//! # Wire Messages
//!
//! Every datagram and every TCP frame carries one [`Message`]: a 1-byte type tag followed
//! by the raw payload. Payloads are hand-encoded little-endian fixed-width fields;
//! strings are a `u32` byte length followed by UTF-8.
//!
//! | Packet | Payload |
//! |---|---|
//! | `ChunkRequest`, `ChunkNotFound` | `i32 x, i32 y, i32 z` |
//! | `ChunkData`, `ChunkGeneratedByClient`, `ClientChunkUpdate` | `i32 x, i32 y, i32 z, i32 size, size bytes` |
//! | `PlayerPositionUpdate` | `f32 x, f32 y, f32 z, f32 yaw, f32 pitch, u8 game mode` |
//! | `ClientInfo` | `string name, u16 udp port` |
//! | `Ping`, `Pong` | `u64 nonce` |
//! | `ClientConnect`, `ClientConnectAck` | empty |

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::NetworkError;
use crate::persistence::chunk_codec::{compress_chunk, decompress_chunk};
use crate::persistence::GameMode;
use crate::voxels::chunk::SavableChunk;
use crate::voxels::coordinate::ChunkCoordinate;

/// Type tag of a message. The discriminant is the byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum MessageType {
    PlayerPositionUpdate = 0,
    ChunkRequest = 1,
    ChunkData = 2,
    ChunkGeneratedByClient = 3,
    ChunkNotFound = 4,
    ClientConnect = 5,
    ClientConnectAck = 6,
    ClientChunkUpdate = 7,
    Ping = 8,
    Pong = 9,
    ClientInfo = 10,
}

/// A tagged, still-encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Message {
            message_type,
            payload,
        }
    }

    /// Size of the message on the wire, tag included.
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.push(self.message_type as u8);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        let (&tag, payload) = bytes.split_first().ok_or(NetworkError::EmptyMessage)?;
        let message_type = MessageType::from_u8(tag).ok_or(NetworkError::UnknownTag(tag))?;
        Ok(Message::new(message_type, payload.to_vec()))
    }
}

/// A compressed chunk together with its coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub coordinate: ChunkCoordinate,
    pub compressed: Vec<u8>,
}

impl ChunkPayload {
    pub fn from_chunk(chunk: &SavableChunk) -> Self {
        ChunkPayload {
            coordinate: chunk.coordinate,
            compressed: compress_chunk(chunk),
        }
    }

    pub fn decode(&self) -> Result<SavableChunk, NetworkError> {
        Ok(decompress_chunk(&self.compressed, self.coordinate)?)
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    PlayerPositionUpdate {
        position: [f32; 3],
        yaw: f32,
        pitch: f32,
        game_mode: GameMode,
    },
    ChunkRequest(ChunkCoordinate),
    ChunkData(ChunkPayload),
    ChunkGeneratedByClient(ChunkPayload),
    ChunkNotFound(ChunkCoordinate),
    ClientConnect,
    ClientConnectAck,
    ClientChunkUpdate(ChunkPayload),
    Ping(u64),
    Pong(u64),
    ClientInfo { player_name: String, udp_port: u16 },
}

impl Packet {
    pub fn message_type(&self) -> MessageType {
        match self {
            Packet::PlayerPositionUpdate { .. } => MessageType::PlayerPositionUpdate,
            Packet::ChunkRequest(_) => MessageType::ChunkRequest,
            Packet::ChunkData(_) => MessageType::ChunkData,
            Packet::ChunkGeneratedByClient(_) => MessageType::ChunkGeneratedByClient,
            Packet::ChunkNotFound(_) => MessageType::ChunkNotFound,
            Packet::ClientConnect => MessageType::ClientConnect,
            Packet::ClientConnectAck => MessageType::ClientConnectAck,
            Packet::ClientChunkUpdate(_) => MessageType::ClientChunkUpdate,
            Packet::Ping(_) => MessageType::Ping,
            Packet::Pong(_) => MessageType::Pong,
            Packet::ClientInfo { .. } => MessageType::ClientInfo,
        }
    }

    pub fn encode(&self) -> Message {
        let mut writer = PayloadWriter::default();
        match self {
            Packet::PlayerPositionUpdate {
                position,
                yaw,
                pitch,
                game_mode,
            } => {
                for value in position {
                    writer.f32(*value);
                }
                writer.f32(*yaw);
                writer.f32(*pitch);
                writer.u8(*game_mode as u8);
            }
            Packet::ChunkRequest(coordinate) | Packet::ChunkNotFound(coordinate) => {
                writer.coordinate(*coordinate);
            }
            Packet::ChunkData(chunk)
            | Packet::ChunkGeneratedByClient(chunk)
            | Packet::ClientChunkUpdate(chunk) => {
                writer.coordinate(chunk.coordinate);
                writer.i32(chunk.compressed.len() as i32);
                writer.bytes(&chunk.compressed);
            }
            Packet::ClientConnect | Packet::ClientConnectAck => {}
            Packet::Ping(nonce) | Packet::Pong(nonce) => writer.u64(*nonce),
            Packet::ClientInfo {
                player_name,
                udp_port,
            } => {
                writer.string(player_name);
                writer.u16(*udp_port);
            }
        }
        Message::new(self.message_type(), writer.finish())
    }

    /// Decodes the payload of `message`. The whole payload must be consumed.
    pub fn decode(message: &Message) -> Result<Self, NetworkError> {
        let mut reader = PayloadReader::new(&message.payload);
        let packet = match message.message_type {
            MessageType::PlayerPositionUpdate => Packet::PlayerPositionUpdate {
                position: [reader.f32()?, reader.f32()?, reader.f32()?],
                yaw: reader.f32()?,
                pitch: reader.f32()?,
                game_mode: {
                    let raw = reader.u8()?;
                    GameMode::from_u8(raw).ok_or_else(|| {
                        NetworkError::InvalidPayload(format!("unknown game mode {}", raw))
                    })?
                },
            },
            MessageType::ChunkRequest => Packet::ChunkRequest(reader.coordinate()?),
            MessageType::ChunkNotFound => Packet::ChunkNotFound(reader.coordinate()?),
            MessageType::ChunkData => Packet::ChunkData(reader.chunk_payload()?),
            MessageType::ChunkGeneratedByClient => {
                Packet::ChunkGeneratedByClient(reader.chunk_payload()?)
            }
            MessageType::ClientChunkUpdate => Packet::ClientChunkUpdate(reader.chunk_payload()?),
            MessageType::ClientConnect => Packet::ClientConnect,
            MessageType::ClientConnectAck => Packet::ClientConnectAck,
            MessageType::Ping => Packet::Ping(reader.u64()?),
            MessageType::Pong => Packet::Pong(reader.u64()?),
            MessageType::ClientInfo => Packet::ClientInfo {
                player_name: reader.string()?,
                udp_port: reader.u16()?,
            },
        };
        reader.finish()?;
        Ok(packet)
    }

    /// Parses a raw datagram or frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        Self::decode(&Message::from_bytes(bytes)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().to_bytes()
    }
}

#[derive(Default)]
struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    fn u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn string(&mut self, value: &str) {
        self.buffer
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buffer.extend_from_slice(value.as_bytes());
    }

    fn coordinate(&mut self, coordinate: ChunkCoordinate) {
        self.i32(coordinate.x);
        self.i32(coordinate.y);
        self.i32(coordinate.z);
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

struct PayloadReader<'a> {
    bytes: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        PayloadReader { bytes }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], NetworkError> {
        let slice = self.take_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], NetworkError> {
        if len > self.bytes.len() {
            return Err(NetworkError::Truncated {
                needed: len,
                available: self.bytes.len(),
            });
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, NetworkError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, NetworkError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, NetworkError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, NetworkError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, NetworkError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn string(&mut self) -> Result<String, NetworkError> {
        let len = u32::from_le_bytes(self.take()?) as usize;
        let raw = self.take_slice(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|err| NetworkError::InvalidPayload(format!("bad utf-8 string: {}", err)))
    }

    fn coordinate(&mut self) -> Result<ChunkCoordinate, NetworkError> {
        Ok(ChunkCoordinate::new(self.i32()?, self.i32()?, self.i32()?))
    }

    fn chunk_payload(&mut self) -> Result<ChunkPayload, NetworkError> {
        let coordinate = self.coordinate()?;
        let size = self.i32()?;
        let size = usize::try_from(size).map_err(|_| {
            NetworkError::InvalidPayload(format!("negative compressed size {}", size))
        })?;
        let compressed = self.take_slice(size)?.to_vec();
        Ok(ChunkPayload {
            coordinate,
            compressed,
        })
    }

    fn finish(self) -> Result<(), NetworkError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::InvalidPayload(format!(
                "{} unexpected trailing bytes",
                self.bytes.len()
            )))
        }
    }
}
