//! # Core Module
//!
//! This module provides the concurrency primitives and shared handles used throughout
//! the streaming engine.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking
//! - `WorkQueue`: Blocking FIFO / priority queue connecting the pipeline stages
//! - `EngineContext`: The collaborators every stage needs, built once per process
//!
//! ## Usage
//! ```rust
//! use voxel_stream::core::{FifoQueue, MtResource};
//!
//! // Thread-safe resource
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//!
//! // Pipeline queue
//! let queue = FifoQueue::new();
//! queue.push(7u32);
//! queue.stop();
//! assert!(!queue.push(8));
//! assert_eq!(queue.wait_pop(), Some(7));
//! assert_eq!(queue.wait_pop(), None);
//! ```

pub mod context;
pub mod mt_resource;
pub mod work_queue;

pub use context::EngineContext;
pub use mt_resource::MtResource;
pub use work_queue::{FifoQueue, PriorityQueue, Prioritized, WorkQueue};
