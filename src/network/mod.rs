//! # Network Module
//!
//! Chunk synchronisation between a disk-backed server and any number of clients.
//!
//! ## Transports
//!
//! * **UDP** carries chunk requests, chunk responses and streamed updates. A packet that
//!   does not fit in one datagram (65507 bytes) is never fragmented.
//! * **TCP** carries the handshake follow-up (player name, UDP port), relayed updates and
//!   anything too large for UDP. Every TCP message is prefixed with its length as a
//!   4-byte little-endian integer.
//!
//! Both transports carry the same envelope: a 1-byte [`MessageType`] tag followed by a
//! hand-rolled little-endian payload.
//!
//! ## Roles
//!
//! * [`Server`]: authoritative, serves chunks from disk and relays client updates
//! * [`Client`]: fetches chunks, falls back to local generation, pushes edits upstream
//!
//! A host runs both in one process.

pub mod client;
pub mod framing;
pub mod message;
pub mod server;

pub use client::{Client, FetchOutcome, PushKind, Transport};
pub use message::{ChunkPayload, Message, MessageType, Packet};
pub use server::{PlayerPosition, Server};
