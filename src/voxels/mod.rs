//! # Voxel World
//!
//! This module contains everything that represents and streams the voxel world around
//! the observer.
//!
//! ## Architecture
//!
//! * **Block**: Block ids, the registry of block properties and per-face geometry
//! * **Chunk**: Fixed 16x16x16 grids of blocks with terrain fill and culled meshing
//! * **Terrain**: Height and biome sources consumed by terrain fill
//! * **World**: The chunk map, the manager thread and the main-thread upload step
//! * **Tasks**: The generation and meshing worker loops
//!
//! ## Data Flow
//!
//! 1. The manager thread turns the observer position into a desired chunk set
//! 2. Generation workers fetch, load or generate each coordinate
//! 3. Meshing workers build vertex/index buffers
//! 4. The main thread uploads finished meshes and publishes the chunks into the map
//! 5. Chunks that fall out of range are saved (or pushed upstream) and dropped
//!
//! ## Thread Safety
//!
//! Chunks move by value through the pipeline queues, so only the stage holding a chunk
//! can mutate it. Once resident, a chunk sits behind an `MtResource` in the map and
//! edits take its write lock for the duration of a remesh.

pub mod block;
pub mod chunk;
pub mod coordinate;
pub mod tasks;
pub mod terrain;
pub mod world;

pub use coordinate::ChunkCoordinate;
