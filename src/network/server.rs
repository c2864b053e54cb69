//! # Chunk Server
//!
//! The authoritative side of chunk synchronisation. One thread per role:
//!
//! - **accept**: takes TCP connections and starts a connection thread per client
//! - **connection**: reads length-prefixed frames from one client
//! - **udp**: receives datagrams and dispatches chunk requests into the request queue
//! - **requests**: drains the request queue and answers with chunk data or not-found
//!
//! Chunks are served from disk through an LRU cache of compressed payloads. Updates
//! pushed by one client are persisted and relayed over TCP to every other client in
//! arrival order.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use lru::LruCache;
use parking_lot::Mutex;

use crate::core::work_queue::FifoQueue;
use crate::error::{NetworkError, StoreError};
use crate::persistence::chunk_codec::decompress_chunk;
use crate::persistence::{ChunkStore, GameMode};
use crate::voxels::coordinate::ChunkCoordinate;

use super::framing::{read_frame, send_datagram, write_packet, MAX_UDP_PAYLOAD};
use super::message::{ChunkPayload, Packet};

/// Sleep between polls of the non-blocking listener, and read timeout of the UDP socket.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Last position reported by a player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub game_mode: GameMode,
}

struct Peer {
    address: SocketAddr,
    /// Control handle, used only to shut the connection down.
    stream: TcpStream,
    /// Writes to one client are serialised here, outside the peer table lock.
    outbound: Arc<Mutex<TcpStream>>,
    player_name: Option<String>,
    udp_address: Option<SocketAddr>,
}

struct ServerShared {
    store: ChunkStore,
    cache: Mutex<LruCache<ChunkCoordinate, Arc<Vec<u8>>>>,
    udp: UdpSocket,
    peers: Mutex<HashMap<u64, Peer>>,
    next_peer_id: AtomicU64,
    positions: Mutex<HashMap<SocketAddr, PlayerPosition>>,
    requests: FifoQueue<(SocketAddr, ChunkCoordinate)>,
    running: AtomicBool,
    connection_threads: Mutex<Vec<JoinHandle<()>>>,
    write_timeout: Duration,
}

/// A running chunk server. Dropping it shuts it down.
pub struct Server {
    shared: Arc<ServerShared>,
    tcp_address: SocketAddr,
    udp_address: SocketAddr,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Binds TCP and UDP on the same port and starts the server threads.
    ///
    /// If `address` has port 0, the port picked for TCP is reused for UDP.
    ///
    /// # Arguments
    /// * `address` - Address to listen on
    /// * `store` - Save directory the server is authoritative for
    /// * `cache_capacity` - Number of compressed chunks kept in memory
    /// * `write_timeout` - Upper bound on a blocked write to one client
    ///
    /// # Returns
    /// [`NetworkError::Bind`] if either socket cannot be bound.
    pub fn start(
        address: SocketAddr,
        store: ChunkStore,
        cache_capacity: usize,
        write_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let listener =
            TcpListener::bind(address).map_err(|source| NetworkError::Bind { address, source })?;
        let tcp_address = listener.local_addr()?;
        let udp_bind = SocketAddr::new(address.ip(), tcp_address.port());
        let udp = UdpSocket::bind(udp_bind).map_err(|source| NetworkError::Bind {
            address: udp_bind,
            source,
        })?;
        let udp_address = udp.local_addr()?;

        listener.set_nonblocking(true)?;
        udp.set_read_timeout(Some(POLL_INTERVAL))?;

        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let shared = Arc::new(ServerShared {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
            udp,
            peers: Mutex::new(HashMap::new()),
            next_peer_id: AtomicU64::new(0),
            positions: Mutex::new(HashMap::new()),
            requests: FifoQueue::new(),
            running: AtomicBool::new(true),
            connection_threads: Mutex::new(Vec::new()),
            write_timeout,
        });

        let mut threads = Vec::new();
        {
            let shared = shared.clone();
            threads.push(spawn_named("server-accept", move || shared.accept_loop(listener))?);
        }
        {
            let shared = shared.clone();
            threads.push(spawn_named("server-udp", move || shared.udp_loop())?);
        }
        {
            let shared = shared.clone();
            threads.push(spawn_named("server-requests", move || shared.request_loop())?);
        }

        info!(
            "Server listening on tcp {} / udp {} for world {}",
            tcp_address,
            udp_address,
            shared.store.world_dir().display()
        );

        Ok(Server {
            shared,
            tcp_address,
            udp_address,
            threads: Mutex::new(threads),
        })
    }

    pub fn tcp_address(&self) -> SocketAddr {
        self.tcp_address
    }

    pub fn udp_address(&self) -> SocketAddr {
        self.udp_address
    }

    pub fn peer_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Names announced by the connected clients.
    pub fn player_names(&self) -> Vec<String> {
        self.shared
            .peers
            .lock()
            .values()
            .filter_map(|peer| peer.player_name.clone())
            .collect()
    }

    pub fn player_position(&self, address: SocketAddr) -> Option<PlayerPosition> {
        self.shared.positions.lock().get(&address).copied()
    }

    pub fn cached_chunks(&self) -> usize {
        self.shared.cache.lock().len()
    }

    /// Stops every server thread and disconnects all clients. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.requests.stop();
        // The accept thread must be gone before the peer table is closed.
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        for peer in self.shared.peers.lock().values() {
            let _ = peer.stream.shutdown(Shutdown::Both);
        }

        let connections: Vec<_> = self.shared.connection_threads.lock().drain(..).collect();
        for handle in connections {
            let _ = handle.join();
        }
        info!("Server on {} stopped", self.tcp_address);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_named<F>(name: &str, body: F) -> Result<JoinHandle<()>, NetworkError>
where
    F: FnOnce() + Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(body)?)
}

impl ServerShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        while self.is_running() {
            match listener.accept() {
                Ok((stream, address)) => {
                    if let Err(err) = self.clone().register_peer(stream, address) {
                        warn!("Failed to set up connection from {}: {}", address, err);
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    warn!("Accept failed: {}", err);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn register_peer(self: Arc<Self>, stream: TcpStream, address: SocketAddr) -> Result<(), NetworkError> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        let reader = stream.try_clone()?;
        let outbound = Arc::new(Mutex::new(stream.try_clone()?));

        let id = self.next_peer_id.fetch_add(1, Ordering::SeqCst);
        self.peers.lock().insert(
            id,
            Peer {
                address,
                stream,
                outbound,
                player_name: None,
                udp_address: None,
            },
        );
        info!("Client {} connected from {}", id, address);

        let shared = self.clone();
        let handle = spawn_named("server-connection", move || {
            shared.connection_loop(id, address, reader)
        })?;
        self.connection_threads.lock().push(handle);
        Ok(())
    }

    fn connection_loop(&self, id: u64, address: SocketAddr, mut reader: TcpStream) {
        while self.is_running() {
            let frame = match read_frame(&mut reader) {
                Ok(frame) => frame,
                Err(err) => {
                    if self.is_running() {
                        info!("Client {} ({}) disconnected: {}", id, address, err);
                    }
                    break;
                }
            };
            match Packet::from_bytes(&frame) {
                Ok(packet) => self.handle_tcp_packet(id, address, packet),
                Err(err) => warn!("Malformed frame from {}: {}", address, err),
            }
        }

        self.drop_peer(id);
    }

    fn handle_tcp_packet(&self, id: u64, address: SocketAddr, packet: Packet) {
        match packet {
            Packet::ClientInfo {
                player_name,
                udp_port,
            } => {
                info!("Client {} is {} (udp port {})", id, player_name, udp_port);
                if let Some(peer) = self.peers.lock().get_mut(&id) {
                    peer.player_name = Some(player_name);
                    peer.udp_address = Some(SocketAddr::new(address.ip(), udp_port));
                }
            }
            Packet::ChunkRequest(coordinate) => {
                let response = match self.lookup(coordinate) {
                    Some(compressed) => Packet::ChunkData(ChunkPayload {
                        coordinate,
                        compressed: compressed.to_vec(),
                    }),
                    None => Packet::ChunkNotFound(coordinate),
                };
                self.send_to_peer(id, &response);
            }
            Packet::ChunkGeneratedByClient(payload) => self.store_generated(payload),
            Packet::ClientChunkUpdate(payload) => self.store_update(payload, Some(id)),
            Packet::Ping(nonce) => self.send_to_peer(id, &Packet::Pong(nonce)),
            Packet::PlayerPositionUpdate {
                position,
                yaw,
                pitch,
                game_mode,
            } => {
                self.positions.lock().insert(
                    address,
                    PlayerPosition {
                        position,
                        yaw,
                        pitch,
                        game_mode,
                    },
                );
            }
            other => debug!("Ignoring {:?} from {}", other.message_type(), address),
        }
    }

    fn udp_loop(&self) {
        let mut buffer = vec![0u8; MAX_UDP_PAYLOAD + 1];
        while self.is_running() {
            let (len, source) = match self.udp.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(err) => {
                    warn!("UDP receive failed: {}", err);
                    continue;
                }
            };
            match Packet::from_bytes(&buffer[..len]) {
                Ok(packet) => self.handle_datagram(source, packet),
                Err(err) => warn!("Malformed datagram from {}: {}", source, err),
            }
        }
    }

    fn handle_datagram(&self, source: SocketAddr, packet: Packet) {
        let reply = match packet {
            Packet::ClientConnect => {
                info!("Handshake from {}", source);
                Some(Packet::ClientConnectAck)
            }
            Packet::ChunkRequest(coordinate) => {
                trace!("UDP request for {} from {}", coordinate, source);
                self.requests.push((source, coordinate));
                None
            }
            Packet::Ping(nonce) => Some(Packet::Pong(nonce)),
            Packet::PlayerPositionUpdate {
                position,
                yaw,
                pitch,
                game_mode,
            } => {
                self.positions.lock().insert(
                    source,
                    PlayerPosition {
                        position,
                        yaw,
                        pitch,
                        game_mode,
                    },
                );
                None
            }
            Packet::ChunkGeneratedByClient(payload) => {
                self.store_generated(payload);
                None
            }
            Packet::ClientChunkUpdate(payload) => {
                let sender = self.peer_by_udp_address(source);
                self.store_update(payload, sender);
                None
            }
            other => {
                debug!("Ignoring {:?} datagram from {}", other.message_type(), source);
                None
            }
        };

        if let Some(reply) = reply {
            if let Err(err) = send_datagram(&self.udp, source, &reply) {
                warn!("Failed to reply to {}: {}", source, err);
            }
        }
    }

    fn request_loop(&self) {
        while let Some((source, coordinate)) = self.requests.wait_pop() {
            self.answer_request(source, coordinate);
        }
    }

    /// Answers a UDP chunk request. Payloads too large for a datagram go over the
    /// requesting client's TCP connection when it is known.
    fn answer_request(&self, source: SocketAddr, coordinate: ChunkCoordinate) {
        let response = match self.lookup(coordinate) {
            Some(compressed) => Packet::ChunkData(ChunkPayload {
                coordinate,
                compressed: compressed.to_vec(),
            }),
            None => Packet::ChunkNotFound(coordinate),
        };

        match send_datagram(&self.udp, source, &response) {
            Ok(()) => {}
            Err(NetworkError::Oversized { size, .. }) => match self.peer_by_udp_address(source) {
                Some(id) => {
                    debug!("Chunk {} ({} bytes) sent to {} over TCP", coordinate, size, source);
                    self.send_to_peer(id, &response);
                }
                None => error!(
                    "Chunk {} is {} bytes, too large for UDP, and {} has no TCP connection",
                    coordinate, size, source
                ),
            },
            Err(err) => warn!("Failed to answer {} for {}: {}", source, coordinate, err),
        }
    }

    /// Compressed payload of a chunk, from the cache or the disk.
    ///
    /// Files that fail to decode are reported and treated as missing.
    fn lookup(&self, coordinate: ChunkCoordinate) -> Option<Arc<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(&coordinate) {
            return Some(cached.clone());
        }

        let loaded = self.store.load_compressed(coordinate).and_then(|found| match found {
            Some(compressed) => decompress_chunk(&compressed, coordinate)
                .map(|_| Some(compressed))
                .map_err(|source| StoreError::Corrupted { coordinate, source }),
            None => Ok(None),
        });

        match loaded {
            Ok(Some(compressed)) => {
                let compressed = Arc::new(compressed);
                self.cache.lock().put(coordinate, compressed.clone());
                Some(compressed)
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Cannot serve chunk {}: {}", coordinate, err);
                None
            }
        }
    }

    /// Persists a chunk a client generated after a not-found answer, unless the server
    /// already holds a valid copy.
    fn store_generated(&self, payload: ChunkPayload) {
        if self.lookup(payload.coordinate).is_some() {
            debug!("Keeping existing chunk {} over client generation", payload.coordinate);
            return;
        }
        self.persist(&payload);
    }

    /// Persists an edited chunk and relays it to every client except `sender`.
    fn store_update(&self, payload: ChunkPayload, sender: Option<u64>) {
        if !self.persist(&payload) {
            return;
        }
        let relay = Packet::ClientChunkUpdate(payload);
        let targets: Vec<u64> = self
            .peers
            .lock()
            .keys()
            .copied()
            .filter(|id| Some(*id) != sender)
            .collect();
        for id in targets {
            self.send_to_peer(id, &relay);
        }
    }

    fn persist(&self, payload: &ChunkPayload) -> bool {
        self.cache.lock().pop(&payload.coordinate);
        match self
            .store
            .save_compressed(payload.coordinate, &payload.compressed)
        {
            Ok(()) => {
                trace!("Stored chunk {} from a client", payload.coordinate);
                true
            }
            Err(err) => {
                warn!("Rejected chunk {} from a client: {}", payload.coordinate, err);
                false
            }
        }
    }

    fn peer_by_udp_address(&self, address: SocketAddr) -> Option<u64> {
        self.peers
            .lock()
            .iter()
            .find(|(_, peer)| peer.udp_address == Some(address))
            .map(|(id, _)| *id)
    }

    /// Writes one frame to a client without holding the peer table.
    ///
    /// A failed or timed out write may have left part of a frame on the wire, so the
    /// client is disconnected rather than sent anything further.
    fn send_to_peer(&self, id: u64, packet: &Packet) {
        let Some((address, outbound)) = self
            .peers
            .lock()
            .get(&id)
            .map(|peer| (peer.address, peer.outbound.clone()))
        else {
            return;
        };

        let result = write_packet(&mut *outbound.lock(), packet);
        match result {
            Ok(()) => {}
            Err(NetworkError::Oversized { size, limit }) => {
                error!("Frame of {} bytes for client {} exceeds {} bytes", size, id, limit)
            }
            Err(err) => {
                warn!("Dropping client {} ({}): {}", id, address, err);
                self.drop_peer(id);
            }
        }
    }

    fn drop_peer(&self, id: u64) {
        if let Some(peer) = self.peers.lock().remove(&id) {
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
    }
}
