//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask`, the worker that turns queued
//! coordinates into chunks. For each coordinate it tries, in order:
//!
//! 1. the server, when online
//! 2. the local save directory
//! 3. procedural terrain generation
//!
//! A chunk that arrives with a usable mesh skips the meshing stage.

use std::sync::Arc;

use log::{info, trace, warn};

use crate::core::Prioritized;
use crate::network::{FetchOutcome, PushKind};
use crate::voxels::chunk::Chunk;
use crate::voxels::coordinate::ChunkCoordinate;
use crate::voxels::world::WorldShared;

use super::Task;

/// Where the blocks of a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    Network,
    Disk,
    Generated,
}

pub struct ChunkGenerationTask {
    shared: Arc<WorldShared>,
}

impl ChunkGenerationTask {
    pub fn new(shared: Arc<WorldShared>) -> Self {
        ChunkGenerationTask { shared }
    }

    /// Produces the chunk at `coordinate` and hands it to the next stage.
    ///
    /// Coordinates whose pending claim was dropped are skipped, as are coordinates below
    /// the lowest generatable layer (their claim is released).
    ///
    /// # Returns
    /// Where the chunk came from, or `None` if the coordinate was skipped.
    pub fn process(&self, coordinate: ChunkCoordinate) -> Option<ChunkSource> {
        let config = &self.shared.context.config;
        {
            let mut map = self.shared.map.lock();
            if !map.is_pending(coordinate) {
                trace!("Skipping stale coordinate {}", coordinate);
                return None;
            }
            if coordinate.y < config.min_generatable_chunk_y {
                map.release_pending(coordinate);
                return None;
            }
        }

        let (chunk, source) = self.obtain(coordinate);
        trace!("Chunk {} from {:?}", coordinate, source);

        let queues = &self.shared.queues;
        if chunk.mesh.needs_update {
            let priority = self.shared.observer().priority(coordinate);
            queues.meshing.push(Prioritized::new(priority, chunk));
        } else {
            queues.upload.push(chunk);
        }
        Some(source)
    }

    fn obtain(&self, coordinate: ChunkCoordinate) -> (Chunk, ChunkSource) {
        let context = &self.shared.context;

        if let Some(client) = &context.client {
            match client.fetch_chunk(coordinate) {
                Ok(FetchOutcome::Found(snapshot)) => match Chunk::from_savable(snapshot) {
                    Ok(chunk) => return (chunk, ChunkSource::Network),
                    Err(err) => warn!("Server sent an invalid chunk {}: {}", coordinate, err),
                },
                Ok(FetchOutcome::NotFound) => {
                    let chunk = self.generate(coordinate);
                    self.shared
                        .queues
                        .network_push
                        .push((PushKind::Generated, chunk.to_savable()));
                    return (chunk, ChunkSource::Generated);
                }
                Err(err) => warn!("Chunk {} unavailable from the server: {}", coordinate, err),
            }
        }

        match context.store.load_chunk(coordinate) {
            Ok(Some(snapshot)) => match Chunk::from_savable(snapshot) {
                Ok(chunk) => return (chunk, ChunkSource::Disk),
                Err(err) => warn!("Discarding saved chunk {}: {}", coordinate, err),
            },
            Ok(None) => {}
            Err(err) => warn!("Discarding saved chunk {}: {}", coordinate, err),
        }

        (self.generate(coordinate), ChunkSource::Generated)
    }

    fn generate(&self, coordinate: ChunkCoordinate) -> Chunk {
        let context = &self.shared.context;
        let mut chunk = Chunk::new(coordinate);
        chunk.generate_terrain(context.terrain.as_ref(), &context.registry);
        chunk
    }
}

impl Task for ChunkGenerationTask {
    const NAME: &'static str = "chunk-generation";

    fn run(self) {
        info!("Chunk generation worker started");
        while let Some(coordinate) = self.shared.queues.creation.wait_pop() {
            if !self.shared.is_running() {
                break;
            }
            self.process(coordinate);
        }
        info!("Chunk generation worker stopped");
    }
}
