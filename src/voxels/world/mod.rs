//! # World Module
//!
//! This module provides the `World`, which streams chunks in and out around a moving
//! observer. It owns the chunk map, the queues connecting the pipeline stages and the
//! threads running them.
//!
//! ## Chunk Lifecycle
//!
//! ```text
//! Unknown -> Pending (creation queue) -> Generating -> meshing queue -> Meshing
//!         -> upload queue -> uploaded queue -> Resident -> removal queue
//!         -> save queue (authoritative roles) -> Unknown
//! ```
//!
//! A coordinate is claimed in the map's pending set when the manager queues it and
//! stays claimed until its chunk is published. Chunks that arrive for a coordinate whose
//! claim was dropped (the observer moved away) are discarded.
//!
//! ## Threads
//!
//! - generation workers: block on the creation queue
//! - meshing workers: poll the update queue, then the meshing queue
//! - manager: one tick every few milliseconds (see [`ChunkManager`])
//! - the caller's render thread: [`World::upload_chunk_meshes`] and
//!   [`World::upload_chunks_to_map`]

pub mod chunk_map;
pub mod manager;
pub mod upload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cgmath::Point3;
use log::{error, info, trace, warn};
use parking_lot::Mutex;

pub use chunk_map::ChunkMap;
pub use manager::{desired_positions, ChunkManager};
pub use upload::{HeadlessUploader, MeshUploader};

use crate::core::work_queue::{FifoQueue, PriorityQueue};
use crate::core::{EngineContext, MtResource};
use crate::error::{ChunkError, EngineError, StoreError};
use crate::network::PushKind;
use crate::persistence::PlayerState;
use crate::voxels::block::{BlockId, BlockSide};
use crate::voxels::chunk::{Chunk, ChunkNeighborhood, MeshHandle, MissingNeighbor, SavableChunk};
use crate::voxels::coordinate::ChunkCoordinate;
use crate::voxels::tasks::{self, ChunkGenerationTask, ChunkMeshGenerationTask};

/// The chunk the observer stands in and how far it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observer {
    pub chunk: ChunkCoordinate,
    /// Horizontal view radius, in chunks.
    pub view_distance: i32,
}

impl Observer {
    /// Whether `coordinate` lies in the square view area.
    pub fn in_view(&self, coordinate: ChunkCoordinate) -> bool {
        coordinate.horizontal_chebyshev(&self.chunk) <= self.view_distance
    }

    /// Whether `coordinate` may stay loaded. One chunk of slack beyond the view area
    /// keeps chunks on the edge from thrashing.
    pub fn in_removal_range(&self, coordinate: ChunkCoordinate) -> bool {
        coordinate.horizontal_chebyshev(&self.chunk) <= self.view_distance + 1
    }

    /// Meshing priority of `coordinate`; nearer chunks come first.
    pub fn priority(&self, coordinate: ChunkCoordinate) -> f32 {
        coordinate.horizontal_distance(&self.chunk)
    }
}

/// The queues between the pipeline stages.
#[derive(Default)]
pub struct PipelineQueues {
    /// Coordinates waiting for a generation worker.
    pub creation: FifoQueue<ChunkCoordinate>,
    /// Freshly generated chunks, nearest to the observer first.
    pub meshing: PriorityQueue<Chunk>,
    /// Resident chunks to remesh after an edit.
    pub updates: FifoQueue<ChunkCoordinate>,
    /// Meshed chunks waiting for the render thread.
    pub upload: FifoQueue<Chunk>,
    /// Uploaded chunks waiting to be published into the map.
    pub uploaded: FifoQueue<Chunk>,
    /// Resident chunks with a staged mesh to swap in and upload.
    pub remesh_upload: FifoQueue<ChunkCoordinate>,
    /// GPU meshes to free on the render thread.
    pub release: FifoQueue<MeshHandle>,
    /// Chunks evicted from the map.
    pub removal: FifoQueue<MtResource<Chunk>>,
    /// Snapshots waiting to be written to disk.
    pub save: FifoQueue<SavableChunk>,
    /// Snapshots waiting to be sent to the server.
    pub network_push: FifoQueue<(PushKind, SavableChunk)>,
}

/// Counters for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub resident: usize,
    pub pending: usize,
    pub creation_queue: usize,
    pub meshing_queue: usize,
    pub update_queue: usize,
    pub upload_queue: usize,
    pub save_queue: usize,
    pub network_queue: usize,
}

/// State shared between the world handle and its threads.
pub struct WorldShared {
    pub context: Arc<EngineContext>,
    pub map: Mutex<ChunkMap>,
    pub queues: PipelineQueues,
    observer: Mutex<Observer>,
    player: Mutex<PlayerState>,
    running: AtomicBool,
}

impl WorldShared {
    pub fn new(context: Arc<EngineContext>, player: PlayerState) -> Self {
        let observer = Observer {
            chunk: ChunkCoordinate::from_world_position(Point3::from(player.position)),
            view_distance: context.config.view_distance,
        };
        WorldShared {
            context,
            map: Mutex::new(ChunkMap::new()),
            queues: PipelineQueues::default(),
            observer: Mutex::new(observer),
            player: Mutex::new(player),
            running: AtomicBool::new(true),
        }
    }

    pub fn observer(&self) -> Observer {
        *self.observer.lock()
    }

    pub fn player(&self) -> PlayerState {
        self.player.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn resident(&self, coordinate: ChunkCoordinate) -> Option<MtResource<Chunk>> {
        self.map.lock().get(coordinate)
    }

    /// Copies the facing layers of the resident neighbours of `coordinate`.
    ///
    /// The map lock is released before any neighbour is locked.
    pub fn neighborhood_of(&self, coordinate: ChunkCoordinate) -> ChunkNeighborhood {
        let handles = self.map.lock().neighbors(coordinate);
        let mut neighborhood = ChunkNeighborhood::isolated(self.context.config.missing_neighbor);
        for side in BlockSide::all() {
            if let Some(handle) = &handles[side as usize] {
                neighborhood.set_layer(side, ChunkNeighborhood::facing_layer(&handle.get(), side));
            }
        }
        neighborhood
    }

    /// Queues a remesh of `coordinate` and of every resident chunk next to it.
    pub fn queue_remesh_with_neighbors(&self, coordinate: ChunkCoordinate) {
        let neighbors: Vec<ChunkCoordinate> = {
            let map = self.map.lock();
            BlockSide::all()
                .into_iter()
                .map(|side| {
                    let (dx, dy, dz) = side.offset();
                    coordinate.offset(dx, dy, dz)
                })
                .filter(|neighbor| map.is_resident(*neighbor))
                .collect()
        };
        self.queues.updates.push(coordinate);
        for neighbor in neighbors {
            self.queues.updates.push(neighbor);
        }
    }
}

/// Handle to a streaming world. Dropping it stops the threads without saving; call
/// [`World::shutdown`] for an orderly stop.
pub struct World {
    shared: Arc<WorldShared>,
    generation_workers: Mutex<Vec<JoinHandle<()>>>,
    meshing_workers: Mutex<Vec<JoinHandle<()>>>,
    manager: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl World {
    /// Creates a world without starting any thread. The pipeline stages can be driven by
    /// hand through [`World::shared`].
    ///
    /// The player state saved for the configured player name is loaded and its position
    /// becomes the initial observer position.
    pub fn new(context: Arc<EngineContext>) -> Self {
        let player = match PlayerState::load(context.store.world_dir(), &context.config.player_name) {
            Ok(player) => player,
            Err(err) => {
                warn!(
                    "Could not read player state for {}: {}; using the default spawn",
                    context.config.player_name, err
                );
                PlayerState::default()
            }
        };

        World {
            shared: Arc::new(WorldShared::new(context, player)),
            generation_workers: Mutex::new(Vec::new()),
            meshing_workers: Mutex::new(Vec::new()),
            manager: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates a world and starts its worker pools and manager thread.
    pub fn start(context: Arc<EngineContext>) -> Result<Self, EngineError> {
        let world = Self::new(context);
        let config = &world.shared.context.config;

        *world.generation_workers.lock() =
            tasks::spawn_pool(config.generation_threads, || ChunkGenerationTask::new(world.shared.clone()))?;
        *world.meshing_workers.lock() = tasks::spawn_pool(config.meshing_threads, || {
            ChunkMeshGenerationTask::new(world.shared.clone())
        })?;
        *world.manager.lock() = Some(ChunkManager::new(world.shared.clone()).spawn()?);

        info!(
            "World {} started with {} generation and {} meshing workers",
            config.world_name, config.generation_threads, config.meshing_threads
        );
        Ok(world)
    }

    pub fn shared(&self) -> &Arc<WorldShared> {
        &self.shared
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.shared.context
    }

    pub fn observer(&self) -> Observer {
        self.shared.observer()
    }

    pub fn player(&self) -> PlayerState {
        self.shared.player()
    }

    /// Moves the observer. The manager reacts on its next tick.
    pub fn set_observer_position(&self, position: Point3<f32>) {
        self.shared.player.lock().position = position.into();
        self.shared.observer.lock().chunk = ChunkCoordinate::from_world_position(position);
    }

    pub fn set_view_distance(&self, view_distance: i32) {
        self.shared.observer.lock().view_distance = view_distance.max(0);
    }

    /// Replaces the player state, moving the observer to its position.
    pub fn set_player(&self, player: PlayerState) {
        let position = Point3::from(player.position);
        *self.shared.player.lock() = player;
        self.shared.observer.lock().chunk = ChunkCoordinate::from_world_position(position);
    }

    pub fn chunk(&self, coordinate: ChunkCoordinate) -> Option<MtResource<Chunk>> {
        self.shared.resident(coordinate)
    }

    /// Handles of every resident chunk, for draw submission.
    pub fn resident_chunks(&self) -> Vec<MtResource<Chunk>> {
        self.shared.map.lock().resident_handles()
    }

    /// Reads the block at a world position.
    ///
    /// # Returns
    /// `None` if the chunk holding it is not resident.
    pub fn get_block(&self, world_x: i32, world_y: i32, world_z: i32) -> Option<BlockId> {
        let coordinate = ChunkCoordinate::from_world_block(world_x, world_y, world_z);
        let origin = coordinate.world_origin();
        let handle = self.shared.resident(coordinate)?;
        let block = handle
            .get()
            .get_block(world_x - origin.x, world_y - origin.y, world_z - origin.z)
            .ok();
        block
    }

    /// Edits a block of a resident chunk.
    ///
    /// The chunk is queued for a remesh, together with each resident neighbour whose
    /// boundary touches the edited cell. Online, the edited chunk is also queued for a
    /// push to the server.
    ///
    /// # Returns
    /// `false` if the chunk holding the block is not resident.
    pub fn set_block(
        &self,
        world_x: i32,
        world_y: i32,
        world_z: i32,
        id: BlockId,
    ) -> Result<bool, ChunkError> {
        let coordinate = ChunkCoordinate::from_world_block(world_x, world_y, world_z);
        let Some(handle) = self.shared.resident(coordinate) else {
            return Ok(false);
        };
        let origin = coordinate.world_origin();
        let (x, y, z) = (world_x - origin.x, world_y - origin.y, world_z - origin.z);

        let snapshot = {
            let mut chunk = handle.get_mut();
            chunk.set_block(x, y, z, id)?;
            self.shared.context.is_online().then(|| chunk.to_savable())
        };

        let queues = &self.shared.queues;
        queues.updates.push(coordinate);
        let touched: Vec<ChunkCoordinate> = BlockSide::all()
            .into_iter()
            .filter_map(|side| {
                let (dx, dy, dz) = side.offset();
                Chunk::index(x + dx, y + dy, z + dz)
                    .is_none()
                    .then(|| coordinate.offset(dx, dy, dz))
            })
            .collect();
        {
            let map = self.shared.map.lock();
            for neighbor in touched.into_iter().filter(|neighbor| map.is_resident(*neighbor)) {
                queues.updates.push(neighbor);
            }
        }

        if let Some(snapshot) = snapshot {
            queues.network_push.push((PushKind::Update, snapshot));
        }
        Ok(true)
    }

    /// Uploads up to `max_per_frame` finished meshes. Must run on the thread that owns the
    /// graphics context.
    ///
    /// Released handles are freed first, then staged remeshes of resident chunks are
    /// swapped in and uploaded, then freshly meshed chunks are uploaded and handed on to
    /// [`World::upload_chunks_to_map`].
    ///
    /// # Returns
    /// The number of meshes processed.
    pub fn upload_chunk_meshes(&self, max_per_frame: usize, uploader: &mut dyn MeshUploader) -> usize {
        let queues = &self.shared.queues;
        for handle in queues.release.drain_all() {
            uploader.release(handle);
        }

        let mut processed = 0;
        for coordinate in queues.remesh_upload.drain_up_to(max_per_frame) {
            let Some(handle) = self.shared.resident(coordinate) else {
                continue;
            };
            let mut chunk = handle.get_mut();
            if !chunk.mesh.swap_staged() {
                continue;
            }
            if let Some(old) = chunk.mesh.handle.take() {
                uploader.release(old);
            }
            upload_mesh(&mut chunk, uploader);
            processed += 1;
        }

        for mut chunk in queues.upload.drain_up_to(max_per_frame.saturating_sub(processed)) {
            if !self.shared.map.lock().is_pending(chunk.coordinate) {
                trace!("Skipping upload of chunk {} that left the view", chunk.coordinate);
                continue;
            }
            upload_mesh(&mut chunk, uploader);
            processed += 1;
            queues.uploaded.push(chunk);
        }
        processed
    }

    /// Publishes up to `max_per_frame` uploaded chunks into the map.
    ///
    /// A chunk whose pending claim was dropped while it was in flight is discarded and
    /// its GPU mesh released. Resident neighbours of a published chunk are queued for a
    /// remesh so the faces along the shared boundary are culled against real data.
    ///
    /// # Returns
    /// The number of chunks published.
    pub fn upload_chunks_to_map(&self, max_per_frame: usize) -> usize {
        let queues = &self.shared.queues;
        let missing = self.shared.context.config.missing_neighbor;
        let mut published = Vec::new();

        for mut chunk in queues.uploaded.drain_up_to(max_per_frame) {
            let coordinate = chunk.coordinate;
            let mut map = self.shared.map.lock();
            if !map.is_pending(coordinate) {
                drop(map);
                if let Some(handle) = chunk.mesh.handle.take() {
                    queues.release.push(handle);
                }
                trace!("Discarded chunk {} that left the view", coordinate);
                continue;
            }
            let exposes_neighbors = missing == MissingNeighbor::Solid || !chunk.is_all_air();
            map.insert_resident(chunk);
            if exposes_neighbors {
                published.push(coordinate);
            }
            trace!("Chunk {} is resident", coordinate);
        }

        let count = published.len();
        for coordinate in published {
            let neighbors: Vec<ChunkCoordinate> = {
                let map = self.shared.map.lock();
                BlockSide::all()
                    .into_iter()
                    .map(|side| {
                        let (dx, dy, dz) = side.offset();
                        coordinate.offset(dx, dy, dz)
                    })
                    .filter(|neighbor| map.is_resident(*neighbor))
                    .collect()
            };
            for neighbor in neighbors {
                queues.updates.push(neighbor);
            }
        }
        count
    }

    pub fn stats(&self) -> WorldStats {
        let (resident, pending) = {
            let map = self.shared.map.lock();
            (map.resident_len(), map.pending_len())
        };
        let queues = &self.shared.queues;
        WorldStats {
            resident,
            pending,
            creation_queue: queues.creation.len(),
            meshing_queue: queues.meshing.len(),
            update_queue: queues.updates.len(),
            upload_queue: queues.upload.len() + queues.uploaded.len() + queues.remesh_upload.len(),
            save_queue: queues.save.len(),
            network_queue: queues.network_push.len(),
        }
    }

    /// Stops the world.
    ///
    /// Threads are joined in order: generation, meshing, manager, network. Then every
    /// resident chunk is saved (authoritative roles only), every GPU mesh released, the
    /// map cleared and the player state written. A chunk that fails to save is logged
    /// and skipped. Calling this again does nothing.
    ///
    /// # Returns
    /// An error only if the player state could not be written.
    pub fn shutdown(&self, uploader: &mut dyn MeshUploader) -> Result<(), StoreError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_threads();

        let context = &self.shared.context;
        let queues = &self.shared.queues;
        ChunkManager::new(self.shared.clone()).flush_network_pushes();
        if let Some(client) = &context.client {
            client.shutdown();
        }

        let authoritative = context.is_authoritative();
        let mut saved = 0usize;
        let mut save = |snapshot: &SavableChunk| match context.store.save_chunk(snapshot) {
            Ok(()) => saved += 1,
            Err(err) => error!("Failed to save chunk {}: {}", snapshot.coordinate, err),
        };

        for snapshot in queues.save.drain_all() {
            save(&snapshot);
        }
        let evicted = queues.removal.drain_all();
        let resident = self.shared.map.lock().drain();
        for handle in evicted.into_iter().chain(resident) {
            let mut chunk = handle.get_mut();
            if authoritative {
                save(&chunk.to_savable());
            }
            if let Some(mesh) = chunk.mesh.handle.take() {
                uploader.release(mesh);
            }
        }

        for handle in queues.release.drain_all() {
            uploader.release(handle);
        }
        for mut chunk in queues.upload.drain_all().into_iter().chain(queues.uploaded.drain_all()) {
            if let Some(handle) = chunk.mesh.handle.take() {
                uploader.release(handle);
            }
        }
        queues.remesh_upload.clear();

        info!("World {} stopped, {} chunks saved", context.config.world_name, saved);
        self.shared
            .player()
            .save(context.store.world_dir(), &context.config.player_name)
    }

    fn stop_threads(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let queues = &self.shared.queues;

        queues.creation.stop();
        for handle in self.generation_workers.lock().drain(..) {
            let _ = handle.join();
        }
        queues.meshing.stop();
        queues.updates.stop();
        for handle in self.meshing_workers.lock().drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.manager.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            self.stop_threads();
        }
    }
}

fn upload_mesh(chunk: &mut Chunk, uploader: &mut dyn MeshUploader) {
    if chunk.mesh.is_empty {
        return;
    }
    match uploader.upload(chunk.coordinate, &chunk.mesh) {
        Ok(handle) => {
            chunk.mesh.handle = Some(handle);
            chunk.mesh.is_uploaded = true;
        }
        Err(err) => error!("Failed to upload chunk {}: {}", chunk.coordinate, err),
    }
}
