//! # Chunk Manager
//!
//! The manager thread keeps the set of loaded chunks centred on the observer. Each tick
//! it:
//!
//! 1. reacts to an observer change: drops queued work that left the view and queues
//!    every newly wanted coordinate, nearest first
//! 2. evicts resident chunks (and drops pending claims) beyond the removal radius
//! 3. turns evicted chunks into mesh releases and save snapshots
//! 4. writes a bounded number of snapshots to disk
//! 5. applies chunk updates pushed by the server
//! 6. sends queued chunks upstream
//!
//! Failures in steps 4 to 6 are logged per chunk; the thread keeps running.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, trace, warn};

use crate::voxels::chunk::Chunk;
use crate::voxels::coordinate::ChunkCoordinate;

use super::{Observer, WorldShared};

/// Every coordinate of the view area of `observer`, ordered nearest first.
///
/// Horizontal offsets are sorted by Euclidean distance; each offset yields all of its
/// vertical layers from `min_y` to `max_y`, the layer of the observer first.
pub fn desired_positions(observer: Observer, min_y: i32, max_y: i32) -> Vec<ChunkCoordinate> {
    let radius = observer.view_distance;
    let mut offsets: Vec<(i32, i32)> = (-radius..=radius)
        .flat_map(|dx| (-radius..=radius).map(move |dz| (dx, dz)))
        .collect();
    offsets.sort_by_key(|&(dx, dz)| dx * dx + dz * dz);

    let mut layers: Vec<i32> = (min_y..=max_y).collect();
    layers.sort_by_key(|&y| (y - observer.chunk.y).abs());

    let mut positions = Vec::with_capacity(offsets.len() * layers.len());
    for (dx, dz) in offsets {
        for &y in &layers {
            positions.push(ChunkCoordinate::new(
                observer.chunk.x + dx,
                y,
                observer.chunk.z + dz,
            ));
        }
    }
    positions
}

pub struct ChunkManager {
    shared: Arc<WorldShared>,
    last_observer: Option<Observer>,
}

impl ChunkManager {
    pub fn new(shared: Arc<WorldShared>) -> Self {
        ChunkManager {
            shared,
            last_observer: None,
        }
    }

    /// Starts the manager thread. It ticks until the world stops running.
    pub fn spawn(mut self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("chunk-manager".into())
            .spawn(move || {
                info!("Chunk manager started");
                let tick = self.shared.context.config.manager_tick();
                while self.shared.is_running() {
                    self.tick();
                    thread::sleep(tick);
                }
                info!("Chunk manager stopped");
            })
    }

    /// Runs one manager tick.
    pub fn tick(&mut self) {
        let observer = self.shared.observer();
        if self.last_observer != Some(observer) {
            self.observer_changed(observer);
            self.last_observer = Some(observer);
        }
        self.evict_out_of_range(observer);
        self.process_removals();
        self.flush_saves();
        self.apply_remote_updates();
        self.flush_network_pushes();
    }

    fn observer_changed(&self, observer: Observer) {
        let queues = &self.shared.queues;
        let config = &self.shared.context.config;

        let stale_positions = queues.creation.retain(|coordinate| observer.in_view(*coordinate));
        let stale_chunks = queues
            .meshing
            .retain(|queued| observer.in_view(queued.item.coordinate));

        let mut queued = 0;
        {
            let mut map = self.shared.map.lock();
            for coordinate in &stale_positions {
                map.release_pending(*coordinate);
            }
            for stale in &stale_chunks {
                map.release_pending(stale.item.coordinate);
            }
            for coordinate in desired_positions(observer, config.min_chunk_y, config.max_chunk_y) {
                if map.mark_pending(coordinate) {
                    queues.creation.push(coordinate);
                    queued += 1;
                }
            }
        }

        debug!(
            "Observer at {} (view {}): dropped {} stale, queued {}",
            observer.chunk,
            observer.view_distance,
            stale_positions.len() + stale_chunks.len(),
            queued
        );

        if let Some(client) = &self.shared.context.client {
            if let Err(err) = client.send_position(&self.shared.player()) {
                warn!("Failed to send player position: {}", err);
            }
        }
    }

    fn evict_out_of_range(&self, observer: Observer) {
        let evicted = {
            let mut map = self.shared.map.lock();
            for coordinate in map.pending_coordinates() {
                if !observer.in_removal_range(coordinate) {
                    map.release_pending(coordinate);
                }
            }
            map.resident_coordinates()
                .into_iter()
                .filter(|coordinate| !observer.in_removal_range(*coordinate))
                .filter_map(|coordinate| map.remove_resident(coordinate))
                .collect::<Vec<_>>()
        };

        if !evicted.is_empty() {
            debug!("Evicting {} chunks", evicted.len());
        }
        for handle in evicted {
            self.shared.queues.removal.push(handle);
        }
    }

    fn process_removals(&self) {
        let queues = &self.shared.queues;
        let authoritative = self.shared.context.is_authoritative();
        for handle in queues.removal.drain_all() {
            let mut chunk = handle.get_mut();
            if let Some(mesh) = chunk.mesh.handle.take() {
                queues.release.push(mesh);
            }
            chunk.mesh.is_uploaded = false;
            if authoritative {
                queues.save.push(chunk.to_savable());
            }
            trace!("Chunk {} unloaded", chunk.coordinate);
        }
    }

    fn flush_saves(&self) {
        let context = &self.shared.context;
        for snapshot in self.shared.queues.save.drain_up_to(context.config.max_saves_per_tick) {
            match context.store.save_chunk(&snapshot) {
                Ok(()) => trace!("Saved chunk {}", snapshot.coordinate),
                Err(err) => error!("Failed to save chunk {}: {}", snapshot.coordinate, err),
            }
        }
    }

    /// Replaces the blocks of resident chunks with the versions pushed by the server and
    /// queues them, and their neighbours, for a remesh. Updates for chunks that are not
    /// resident are dropped; the chunk is fetched fresh when it is next wanted.
    fn apply_remote_updates(&self) {
        let Some(client) = &self.shared.context.client else {
            return;
        };
        for update in client.incoming_updates().drain_all() {
            let coordinate = update.coordinate;
            let Some(handle) = self.shared.resident(coordinate) else {
                trace!("Ignoring update for chunk {} that is not loaded", coordinate);
                continue;
            };
            match Chunk::from_savable(update) {
                Ok(remote) => {
                    handle.get_mut().replace_blocks(Box::new(*remote.blocks()));
                    self.shared.queue_remesh_with_neighbors(coordinate);
                    debug!("Applied server update to chunk {}", coordinate);
                }
                Err(err) => warn!("Discarding server update for chunk {}: {}", coordinate, err),
            }
        }
    }

    /// Sends every queued chunk to the server. Offline, the queue is simply cleared.
    pub fn flush_network_pushes(&self) {
        let queues = &self.shared.queues;
        let Some(client) = &self.shared.context.client else {
            queues.network_push.clear();
            return;
        };
        for (kind, snapshot) in queues.network_push.drain_all() {
            match client.push_chunk(kind, &snapshot) {
                Ok(transport) => trace!("Pushed chunk {} over {:?}", snapshot.coordinate, transport),
                Err(err) => warn!("Failed to push chunk {} upstream: {}", snapshot.coordinate, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::{EngineContext, Prioritized};
    use crate::persistence::PlayerState;
    use crate::voxels::block::{BlockRegistry, DefaultBlock};
    use crate::voxels::terrain::FlatTerrain;

    fn shared(dir: &std::path::Path, view_distance: i32) -> Arc<WorldShared> {
        let config = EngineConfig {
            save_root: dir.to_path_buf(),
            view_distance,
            min_chunk_y: 0,
            max_chunk_y: 1,
            max_saves_per_tick: 2,
            ..EngineConfig::default()
        };
        let context = EngineContext::new(
            config,
            BlockRegistry::with_default_blocks(),
            Box::new(FlatTerrain::new(20.0)),
            None,
        );
        let player = PlayerState {
            position: [8.0, 8.0, 8.0],
            ..PlayerState::default()
        };
        Arc::new(WorldShared::new(context, player))
    }

    #[test]
    fn desired_positions_are_nearest_first_and_cover_the_square() {
        let observer = Observer {
            chunk: ChunkCoordinate::new(10, 0, 0),
            view_distance: 4,
        };
        let positions = desired_positions(observer, -2, 10);
        assert_eq!(positions.len(), 9 * 9 * 13);
        assert_eq!(positions[0], ChunkCoordinate::new(10, 0, 0));
        assert!(positions
            .iter()
            .all(|p| (6..=14).contains(&p.x) && (-4..=4).contains(&p.z) && (-2..=10).contains(&p.y)));

        let distances: Vec<f32> = positions.iter().map(|p| observer.priority(*p)).collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn first_tick_queues_the_view_area() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(dir.path(), 1);
        let mut manager = ChunkManager::new(shared.clone());
        manager.tick();

        assert_eq!(shared.queues.creation.len(), 9 * 2);
        assert_eq!(shared.map.lock().pending_len(), 9 * 2);
        assert_eq!(shared.queues.creation.try_pop(), Some(ChunkCoordinate::new(0, 0, 0)));

        manager.tick();
        assert_eq!(shared.queues.creation.len(), 9 * 2 - 1);
    }

    #[test]
    fn moving_drops_stale_work_and_skips_known_positions() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(dir.path(), 1);
        let mut manager = ChunkManager::new(shared.clone());
        manager.tick();

        let meshing = ChunkCoordinate::new(-1, 0, -1);
        shared.queues.creation.retain(|c| *c != meshing);
        shared.queues.meshing.push(Prioritized::new(1.0, Chunk::new(meshing)));
        let resident = ChunkCoordinate::new(1, 0, 0);
        {
            let mut map = shared.map.lock();
            map.insert_resident(Chunk::new(resident));
        }
        shared.queues.creation.retain(|c| *c != resident);
        let claimed = ChunkCoordinate::new(-1, 1, 0);
        shared.queues.creation.retain(|c| *c != claimed);

        *shared.observer.lock() = Observer {
            chunk: ChunkCoordinate::new(1, 0, 0),
            view_distance: 1,
        };
        manager.tick();

        let queued = shared.queues.creation.drain_all();
        assert!(queued.iter().all(|c| (0..=2).contains(&c.x) && (-1..=1).contains(&c.z)));
        assert!(!queued.contains(&resident));
        assert!(queued.contains(&ChunkCoordinate::new(2, 1, 1)));
        assert!(shared.queues.meshing.is_empty());
        assert!(!shared.map.lock().is_pending(meshing));
        assert!(!shared.map.lock().is_pending(ChunkCoordinate::new(-1, 0, 1)));
        // held by a worker and still inside the removal radius
        assert!(shared.map.lock().is_pending(claimed));
    }

    #[test]
    fn eviction_saves_authoritative_chunks_in_bounded_batches() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(dir.path(), 1);
        let mut manager = ChunkManager::new(shared.clone());
        manager.tick();

        let far: Vec<ChunkCoordinate> = (0..3).map(|z| ChunkCoordinate::new(5, 0, z)).collect();
        {
            let mut map = shared.map.lock();
            for coordinate in &far {
                let mut chunk = Chunk::filled(*coordinate, DefaultBlock::STONE.id());
                chunk.mesh.handle = Some(crate::voxels::chunk::MeshHandle(coordinate.z as u64));
                map.insert_resident(chunk);
            }
            map.mark_pending(ChunkCoordinate::new(-7, 0, 0));
        }

        manager.tick();
        assert!(far.iter().all(|c| !shared.map.lock().is_resident(*c)));
        assert!(!shared.map.lock().is_pending(ChunkCoordinate::new(-7, 0, 0)));
        assert_eq!(shared.queues.release.len(), 3);
        assert_eq!(shared.queues.save.len(), 1);
        assert_eq!(shared.context.store.saved_coordinates().unwrap().len(), 2);

        manager.tick();
        assert_eq!(shared.context.store.saved_coordinates().unwrap().len(), 3);
    }
}
