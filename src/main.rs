//! # Voxel Stream Entry Point
//!
//! Runs the engine headless. The optional first argument is the path of a JSON config
//! file; type `quit` or close standard input to stop.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -- server.json
//! ```

fn main() {
    voxel_stream::run();
}
