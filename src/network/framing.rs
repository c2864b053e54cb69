//! Transport helpers: length-prefixed TCP frames and size-checked UDP datagrams.

use std::io::{Read, Write};
use std::net::{SocketAddr, UdpSocket};

use crate::error::NetworkError;

use super::message::Packet;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Largest TCP frame accepted from a peer.
pub const MAX_TCP_FRAME: usize = 16 * 1024 * 1024;

/// Writes one frame: a 4-byte little-endian length followed by the bytes.
pub fn write_frame<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), NetworkError> {
    if bytes.len() > MAX_TCP_FRAME {
        return Err(NetworkError::Oversized {
            size: bytes.len(),
            limit: MAX_TCP_FRAME,
        });
    }
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame written by [`write_frame`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, NetworkError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_TCP_FRAME {
        return Err(NetworkError::Oversized {
            size: len,
            limit: MAX_TCP_FRAME,
        });
    }
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame)?;
    Ok(frame)
}

pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<(), NetworkError> {
    write_frame(writer, &packet.to_bytes())
}

/// Sends a packet as one datagram.
///
/// # Returns
/// [`NetworkError::Oversized`] without sending anything if the encoded packet does not
/// fit in a datagram.
pub fn send_datagram(socket: &UdpSocket, to: SocketAddr, packet: &Packet) -> Result<(), NetworkError> {
    let bytes = packet.to_bytes();
    if bytes.len() > MAX_UDP_PAYLOAD {
        return Err(NetworkError::Oversized {
            size: bytes.len(),
            limit: MAX_UDP_PAYLOAD,
        });
    }
    socket.send_to(&bytes, to)?;
    Ok(())
}

/// Whether an I/O error is just a read timeout on a socket with `set_read_timeout`.
pub fn is_timeout(err: &NetworkError) -> bool {
    match err {
        NetworkError::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}
