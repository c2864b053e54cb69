//! # Chunk Client
//!
//! The client side of chunk synchronisation.
//!
//! Connecting performs a UDP handshake (`ClientConnect` answered by `ClientConnectAck`)
//! and then opens the TCP control connection, announcing the player name and the local
//! UDP port. Two background threads then run for the lifetime of the client:
//!
//! - **udp**: receives chunk updates pushed by the server
//! - **tcp**: receives relayed updates and any response too large for a datagram
//!
//! A generation worker fetching a chunk blocks on the UDP socket itself. While it does,
//! the background UDP loop stands down so it cannot steal the response.

use std::collections::{HashMap, HashSet};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use crate::core::work_queue::FifoQueue;
use crate::error::NetworkError;
use crate::persistence::PlayerState;
use crate::voxels::chunk::SavableChunk;
use crate::voxels::coordinate::ChunkCoordinate;

use super::framing::{is_timeout, read_frame, send_datagram, write_packet, MAX_UDP_PAYLOAD};
use super::message::{ChunkPayload, Packet};
use super::server::POLL_INTERVAL;

/// Interval between handshake retransmissions.
const HANDSHAKE_RESEND: Duration = Duration::from_millis(500);

/// Result of asking the server for a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(SavableChunk),
    NotFound,
}

/// Why a chunk is pushed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// Generated locally after the server reported it missing.
    Generated,
    /// Edited locally.
    Update,
}

/// Channel a message went out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

struct ClientShared {
    server: SocketAddr,
    udp: UdpSocket,
    /// Held by whoever is currently reading from `udp`.
    udp_reader: Mutex<()>,
    fetch_in_progress: AtomicBool,
    tcp: Mutex<TcpStream>,
    awaiting: Mutex<HashSet<ChunkCoordinate>>,
    tcp_deliveries: Mutex<HashMap<ChunkCoordinate, Packet>>,
    incoming_updates: FifoQueue<SavableChunk>,
    running: AtomicBool,
    read_timeout: Duration,
}

/// A connection to a chunk server. Dropping it disconnects.
pub struct Client {
    shared: Arc<ClientShared>,
    player_name: String,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Clears the fetch flag when the fetch ends, however it ends.
struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Client {
    /// Connects to a server.
    ///
    /// # Arguments
    /// * `server` - Address of the server (TCP and UDP share the port)
    /// * `player_name` - Name announced over TCP
    /// * `handshake_timeout` - How long to wait for `ClientConnectAck`
    /// * `read_timeout` - How long a chunk fetch waits for its answer
    ///
    /// # Returns
    /// [`NetworkError::HandshakeTimeout`] if the server does not answer the handshake.
    pub fn connect(
        server: SocketAddr,
        player_name: &str,
        handshake_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let udp = UdpSocket::bind(local)?;
        udp.set_read_timeout(Some(POLL_INTERVAL))?;
        Self::handshake(&udp, server, handshake_timeout)?;

        let tcp = TcpStream::connect_timeout(&server, handshake_timeout)?;
        tcp.set_nodelay(true)?;
        tcp.set_write_timeout(Some(read_timeout))?;
        let reader = tcp.try_clone()?;

        let shared = Arc::new(ClientShared {
            server,
            udp,
            udp_reader: Mutex::new(()),
            fetch_in_progress: AtomicBool::new(false),
            tcp: Mutex::new(tcp),
            awaiting: Mutex::new(HashSet::new()),
            tcp_deliveries: Mutex::new(HashMap::new()),
            incoming_updates: FifoQueue::new(),
            running: AtomicBool::new(true),
            read_timeout,
        });

        let udp_port = shared.udp.local_addr()?.port();
        shared.send_tcp(&Packet::ClientInfo {
            player_name: player_name.to_string(),
            udp_port,
        })?;

        let mut threads = Vec::new();
        {
            let shared = shared.clone();
            threads.push(
                thread::Builder::new()
                    .name("client-udp".into())
                    .spawn(move || shared.udp_loop())?,
            );
        }
        {
            let shared = shared.clone();
            threads.push(
                thread::Builder::new()
                    .name("client-tcp".into())
                    .spawn(move || shared.tcp_loop(reader))?,
            );
        }

        info!("Connected to {} as {}", server, player_name);
        Ok(Client {
            shared,
            player_name: player_name.to_string(),
            threads: Mutex::new(threads),
        })
    }

    fn handshake(udp: &UdpSocket, server: SocketAddr, timeout: Duration) -> Result<(), NetworkError> {
        let deadline = Instant::now() + timeout;
        let mut next_send = Instant::now();
        let mut buffer = vec![0u8; MAX_UDP_PAYLOAD];

        while Instant::now() < deadline {
            if Instant::now() >= next_send {
                send_datagram(udp, server, &Packet::ClientConnect)?;
                next_send = Instant::now() + HANDSHAKE_RESEND;
            }
            match udp.recv_from(&mut buffer) {
                Ok((len, from)) if from == server => {
                    if let Ok(Packet::ClientConnectAck) = Packet::from_bytes(&buffer[..len]) {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    let err = NetworkError::from(err);
                    if !is_timeout(&err) {
                        debug!("Handshake receive failed: {}", err);
                    }
                }
            }
        }

        Err(NetworkError::HandshakeTimeout(server))
    }

    pub fn server_address(&self) -> SocketAddr {
        self.shared.server
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Updates pushed by the server, waiting to be applied to resident chunks.
    pub fn incoming_updates(&self) -> &FifoQueue<SavableChunk> {
        &self.shared.incoming_updates
    }

    /// Requests a chunk over UDP and blocks until the server answers.
    ///
    /// Answers too large for a datagram arrive on the TCP connection and are picked up
    /// here as well.
    ///
    /// Fetches are serialised: the caller owns the UDP socket for the whole exchange, so
    /// concurrent callers (one per generation worker) queue behind each other, each
    /// waiting at most the read timeout once it gets its turn.
    ///
    /// # Returns
    /// [`NetworkError::FetchTimeout`] if nothing arrives within the read timeout; the
    /// caller treats this like any other failure and generates locally.
    pub fn fetch_chunk(&self, coordinate: ChunkCoordinate) -> Result<FetchOutcome, NetworkError> {
        let shared = &self.shared;
        shared.fetch_in_progress.store(true, Ordering::SeqCst);
        let _flag = FetchGuard(&shared.fetch_in_progress);
        let _reader = shared.udp_reader.lock();

        shared.awaiting.lock().insert(coordinate);
        let outcome = shared.await_chunk(coordinate);
        shared.awaiting.lock().remove(&coordinate);
        shared.tcp_deliveries.lock().remove(&coordinate);
        outcome
    }

    /// Sends a chunk upstream: UDP when it fits in a datagram, TCP otherwise.
    pub fn push_chunk(&self, kind: PushKind, chunk: &SavableChunk) -> Result<Transport, NetworkError> {
        let payload = ChunkPayload::from_chunk(chunk);
        let packet = match kind {
            PushKind::Generated => Packet::ChunkGeneratedByClient(payload),
            PushKind::Update => Packet::ClientChunkUpdate(payload),
        };

        match send_datagram(&self.shared.udp, self.shared.server, &packet) {
            Ok(()) => {
                trace!("Pushed chunk {} over UDP", chunk.coordinate);
                Ok(Transport::Udp)
            }
            Err(NetworkError::Oversized { size, limit }) => {
                error!(
                    "Chunk {} is {} bytes, over the {} byte datagram limit; sending over TCP",
                    chunk.coordinate, size, limit
                );
                self.shared.send_tcp(&packet)?;
                Ok(Transport::Tcp)
            }
            Err(err) => Err(err),
        }
    }

    pub fn send_position(&self, player: &PlayerState) -> Result<(), NetworkError> {
        send_datagram(
            &self.shared.udp,
            self.shared.server,
            &Packet::PlayerPositionUpdate {
                position: player.position,
                yaw: player.yaw,
                pitch: player.pitch,
                game_mode: player.game_mode,
            },
        )
    }

    /// Sends a ping; the round trip is logged when the pong arrives.
    pub fn ping(&self) -> Result<(), NetworkError> {
        send_datagram(&self.shared.udp, self.shared.server, &Packet::Ping(now_micros()))
    }

    /// Stops the background threads and closes the TCP connection. Safe to call
    /// repeatedly.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.tcp.lock().shutdown(Shutdown::Both);
        self.shared.incoming_updates.stop();
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        info!("Disconnected from {}", self.shared.server);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

impl ClientShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn send_tcp(&self, packet: &Packet) -> Result<(), NetworkError> {
        write_packet(&mut *self.tcp.lock(), packet)
    }

    /// Body of a fetch; the caller holds the UDP reader lock.
    fn await_chunk(&self, coordinate: ChunkCoordinate) -> Result<FetchOutcome, NetworkError> {
        send_datagram(&self.udp, self.server, &Packet::ChunkRequest(coordinate))?;

        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = vec![0u8; MAX_UDP_PAYLOAD + 1];
        while Instant::now() < deadline && self.is_running() {
            if let Some(packet) = self.tcp_deliveries.lock().remove(&coordinate) {
                if let Some(outcome) = self.answer_for(coordinate, packet)? {
                    return Ok(outcome);
                }
            }

            let (len, from) = match self.udp.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(err) => {
                    let err = NetworkError::from(err);
                    if is_timeout(&err) {
                        continue;
                    }
                    return Err(err);
                }
            };
            if from != self.server {
                continue;
            }
            match Packet::from_bytes(&buffer[..len]) {
                Ok(packet) => {
                    if let Some(outcome) = self.answer_for(coordinate, packet)? {
                        return Ok(outcome);
                    }
                }
                Err(err) => warn!("Malformed datagram from {}: {}", from, err),
            }
        }

        Err(NetworkError::FetchTimeout(coordinate))
    }

    /// Interprets a packet received while waiting for `coordinate`.
    ///
    /// Updates for other chunks are queued; stale answers to earlier fetches are dropped.
    fn answer_for(
        &self,
        coordinate: ChunkCoordinate,
        packet: Packet,
    ) -> Result<Option<FetchOutcome>, NetworkError> {
        match packet {
            Packet::ChunkData(payload) | Packet::ClientChunkUpdate(payload)
                if payload.coordinate == coordinate =>
            {
                Ok(Some(FetchOutcome::Found(payload.decode()?)))
            }
            Packet::ChunkNotFound(missing) if missing == coordinate => Ok(Some(FetchOutcome::NotFound)),
            Packet::ClientChunkUpdate(payload) => {
                self.queue_update(payload);
                Ok(None)
            }
            other => {
                trace!("Ignoring {:?} while fetching {}", other.message_type(), coordinate);
                Ok(None)
            }
        }
    }

    fn queue_update(&self, payload: ChunkPayload) {
        match payload.decode() {
            Ok(chunk) => {
                self.incoming_updates.push(chunk);
            }
            Err(err) => warn!("Discarding update for {}: {}", payload.coordinate, err),
        }
    }

    fn udp_loop(&self) {
        let mut buffer = vec![0u8; MAX_UDP_PAYLOAD + 1];
        while self.is_running() {
            if self.fetch_in_progress.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL / 4);
                continue;
            }
            let Some(_reader) = self.udp_reader.try_lock() else {
                thread::sleep(POLL_INTERVAL / 4);
                continue;
            };

            let (len, from) = match self.udp.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(err) => {
                    let err = NetworkError::from(err);
                    if !is_timeout(&err) {
                        warn!("UDP receive failed: {}", err);
                    }
                    continue;
                }
            };
            if from != self.server {
                continue;
            }
            match Packet::from_bytes(&buffer[..len]) {
                Ok(Packet::ClientChunkUpdate(payload)) | Ok(Packet::ChunkData(payload)) => {
                    self.queue_update(payload)
                }
                Ok(Packet::Pong(sent)) => {
                    debug!("Pong from {}: {} us", from, now_micros().saturating_sub(sent))
                }
                Ok(other) => trace!("Ignoring {:?} datagram", other.message_type()),
                Err(err) => warn!("Malformed datagram from {}: {}", from, err),
            }
        }
    }

    fn tcp_loop(&self, mut reader: TcpStream) {
        while self.is_running() {
            let frame = match read_frame(&mut reader) {
                Ok(frame) => frame,
                Err(err) => {
                    if self.is_running() {
                        warn!("Lost TCP connection to {}: {}", self.server, err);
                    }
                    break;
                }
            };
            let packet = match Packet::from_bytes(&frame) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("Malformed frame from {}: {}", self.server, err);
                    continue;
                }
            };

            match packet {
                Packet::ChunkData(ref payload) if self.awaiting.lock().contains(&payload.coordinate) => {
                    self.tcp_deliveries.lock().insert(payload.coordinate, packet.clone());
                }
                Packet::ChunkNotFound(coordinate) if self.awaiting.lock().contains(&coordinate) => {
                    self.tcp_deliveries.lock().insert(coordinate, packet);
                }
                Packet::ClientChunkUpdate(payload) => self.queue_update(payload),
                Packet::Pong(sent) => {
                    debug!("Pong from {}: {} us", self.server, now_micros().saturating_sub(sent))
                }
                other => trace!("Ignoring {:?} frame", other.message_type()),
            }
        }
    }
}
