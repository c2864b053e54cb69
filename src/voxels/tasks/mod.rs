//! # Voxel Task System
//!
//! The long-running worker loops of the streaming pipeline. Each worker owns a handle
//! to the shared world state and runs until the world stops.
//!
//! # Available Tasks
//! - `ChunkGenerationTask`: fetches, loads or generates the blocks of queued coordinates
//! - `ChunkMeshGenerationTask`: builds the mesh of generated and edited chunks
//!
//! Both expose the per-item step (`process`) separately from the loop so a single item
//! can be pushed through a stage deterministically.

pub mod chunk_generation_task;
pub mod chunk_mesh_generation_task;

use std::io;
use std::thread::{self, JoinHandle};

use log::info;

pub use chunk_generation_task::{ChunkGenerationTask, ChunkSource};
pub use chunk_mesh_generation_task::{ChunkMeshGenerationTask, MeshOutcome};

/// A worker loop that can be run on its own thread.
pub trait Task: Send + 'static {
    /// Thread name prefix.
    const NAME: &'static str;

    /// Runs the loop until the world stops.
    fn run(self);
}

/// Starts `count` threads, each running a task built by `make`.
///
/// # Arguments
/// * `count` - Number of worker threads
/// * `make` - Builds the task for one thread
///
/// # Returns
/// The join handles, in start order.
pub fn spawn_pool<T: Task>(count: usize, make: impl Fn() -> T) -> io::Result<Vec<JoinHandle<()>>> {
    info!(
        "Starting {} {} workers (available parallelism: {:?})",
        count,
        T::NAME,
        thread::available_parallelism()
    );

    (0..count)
        .map(|index| {
            let task = make();
            thread::Builder::new()
                .name(format!("{}-{}", T::NAME, index))
                .spawn(move || task.run())
        })
        .collect()
}
