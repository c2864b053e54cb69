//! Task for generating mesh data for chunks in a background thread.
//!
//! Edits to resident chunks take precedence over freshly generated chunks. A resident
//! chunk is remeshed into its staging buffers under its write lock; the render thread
//! swaps them in on upload. Fresh chunks are meshed straight into their live buffers
//! since nothing draws them yet.

use std::sync::Arc;
use std::thread;

use log::{info, trace};

use crate::voxels::chunk::Chunk;
use crate::voxels::coordinate::ChunkCoordinate;
use crate::voxels::world::WorldShared;

use super::Task;

/// What the meshing stage did with one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshOutcome {
    /// Meshed and queued for upload.
    Meshed,
    /// Nothing to mesh; forwarded to upload as is.
    Forwarded,
    /// Remeshed into the staging buffers of a resident chunk.
    Staged,
    /// Dropped: out of view or no longer resident.
    Skipped,
}

pub struct ChunkMeshGenerationTask {
    shared: Arc<WorldShared>,
}

impl ChunkMeshGenerationTask {
    pub fn new(shared: Arc<WorldShared>) -> Self {
        ChunkMeshGenerationTask { shared }
    }

    /// Handles the next queued item, edits first.
    ///
    /// # Returns
    /// `None` if both queues were empty.
    pub fn process_next(&self) -> Option<MeshOutcome> {
        let queues = &self.shared.queues;
        if let Some(coordinate) = queues.updates.try_pop() {
            return Some(self.remesh_resident(coordinate));
        }
        queues
            .meshing
            .try_pop()
            .map(|queued| self.mesh_generated(queued.item))
    }

    /// Meshes a chunk fresh from the generation stage and queues it for upload.
    ///
    /// A chunk that left the view since it was queued is dropped along with its claim.
    pub fn mesh_generated(&self, mut chunk: Chunk) -> MeshOutcome {
        let coordinate = chunk.coordinate;
        if !self.shared.observer().in_view(coordinate) {
            self.shared.map.lock().release_pending(coordinate);
            trace!("Dropping chunk {} that left the view before meshing", coordinate);
            return MeshOutcome::Skipped;
        }

        let outcome = if chunk.mesh.needs_update {
            let neighborhood = self.shared.neighborhood_of(coordinate);
            chunk.generate_mesh(&neighborhood, &self.shared.context.registry);
            MeshOutcome::Meshed
        } else {
            MeshOutcome::Forwarded
        };
        self.shared.queues.upload.push(chunk);
        outcome
    }

    /// Rebuilds the mesh of a resident chunk into its staging buffers.
    pub fn remesh_resident(&self, coordinate: ChunkCoordinate) -> MeshOutcome {
        let Some(handle) = self.shared.resident(coordinate) else {
            trace!("Skipping remesh of chunk {} that is no longer loaded", coordinate);
            return MeshOutcome::Skipped;
        };

        let neighborhood = self.shared.neighborhood_of(coordinate);
        handle
            .get_mut()
            .generate_staged_mesh(&neighborhood, &self.shared.context.registry);
        self.shared.queues.remesh_upload.push(coordinate);
        MeshOutcome::Staged
    }
}

impl Task for ChunkMeshGenerationTask {
    const NAME: &'static str = "chunk-meshing";

    fn run(self) {
        info!("Chunk meshing worker started");
        let idle = self.shared.context.config.worker_idle_sleep();
        while self.shared.is_running() {
            if self.process_next().is_none() {
                thread::sleep(idle);
            }
        }
        info!("Chunk meshing worker stopped");
    }
}
