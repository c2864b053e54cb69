//! # Voxel Stream
//!
//! The streaming engine under a block-based voxel game: it generates, meshes, persists,
//! synchronises and evicts a chunked 3D world around a moving observer.
//!
//! ## Key Modules
//!
//! * `core` - Work queues, shared resource handles and the engine context
//! * `voxels` - Blocks, chunks, terrain, the world orchestrator and its worker tasks
//! * `persistence` - The compressed chunk codec and the save directory layout
//! * `network` - The UDP/TCP chunk synchronisation protocol
//! * `config` - Process configuration
//!
//! ## Architecture
//!
//! Every pipeline stage runs on its own threads and hands chunks to the next through a
//! [`core::WorkQueue`]:
//!
//! ```text
//! observer -> manager -> creation queue -> generation workers -> meshing queue
//!          -> meshing workers -> upload queue -> render thread -> chunk map
//! ```
//!
//! Rendering itself is left to the caller, who implements
//! [`voxels::world::MeshUploader`] and calls [`voxels::world::World::upload_chunk_meshes`]
//! and [`voxels::world::World::upload_chunks_to_map`] once per frame.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     voxel_stream::run();
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod persistence;
pub mod voxels;

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::{EngineConfig, Role};
use crate::core::EngineContext;
use crate::error::EngineError;
use crate::network::{Client, Server};
use crate::persistence::ChunkStore;
use crate::voxels::world::{HeadlessUploader, World};

/// Frame interval of the headless driver loop.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Interval between statistics log lines.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Starts the engine with the configuration file named by the first command line
/// argument, or the defaults when none is given. Runs until standard input reaches
/// end of file or reads `quit`.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(Path::new(&path)),
        None => Ok(EngineConfig::default()),
    };
    let result = config.and_then(|config| {
        config.validate()?;
        run_with(config)
    });
    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

/// Runs the roles named in `config` until a stop is requested on standard input.
///
/// A server that cannot bind its sockets ends the process immediately.
pub fn run_with(mut config: EngineConfig) -> Result<(), EngineError> {
    let stop = watch_stdin();

    let server = if config.role.runs_server() {
        let address = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
        let store = ChunkStore::new(&config.save_root, &config.world_name);
        match Server::start(
            address,
            store,
            config.chunk_cache_capacity,
            config.network_read_timeout(),
        ) {
            Ok(server) => {
                info!("Serving world {} on {}", config.world_name, server.tcp_address());
                Some(server)
            }
            Err(err) => {
                error!("Server startup failed: {}", err);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    if !config.role.runs_world() {
        wait_for_stop(&stop, || {
            if let Some(server) = &server {
                info!(
                    "{} players connected, {} chunks cached",
                    server.peer_count(),
                    server.cached_chunks()
                );
            }
        });
        if let Some(server) = &server {
            server.shutdown();
        }
        return Ok(());
    }

    let client = if config.role.runs_client() {
        match connect(&config) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("Could not reach the server ({}); continuing offline", err);
                config.role = Role::Offline;
                None
            }
        }
    } else {
        None
    };

    let context = EngineContext::open(config, client)?;
    let world = World::start(context.clone())?;
    let mut uploader = HeadlessUploader::new();
    let max_uploads = context.config.max_uploads_per_frame;

    let mut last_stats = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        world.upload_chunk_meshes(max_uploads, &mut uploader);
        world.upload_chunks_to_map(max_uploads);
        if last_stats.elapsed() >= STATS_INTERVAL {
            info!("{:?}, {} meshes on the GPU", world.stats(), uploader.live_meshes());
            last_stats = Instant::now();
        }
        thread::sleep(FRAME_INTERVAL);
    }

    let saved = world.shutdown(&mut uploader);
    if let Some(server) = &server {
        server.shutdown();
    }
    saved?;
    Ok(())
}

fn connect(config: &EngineConfig) -> Result<Client, EngineError> {
    let address = if config.role == Role::Host {
        std::net::SocketAddr::from(([127, 0, 0, 1], config.port))
    } else {
        config.server_socket_addr()?
    };
    Ok(Client::connect(
        address,
        &config.player_name,
        config.handshake_timeout(),
        config.network_read_timeout(),
    )?)
}

/// Sets the returned flag once standard input closes or reads `quit`.
fn watch_stdin() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim() == "quit" => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        flag.store(true, Ordering::SeqCst);
    });
    if let Err(err) = spawned {
        warn!("Cannot watch standard input: {}", err);
    }
    stop
}

fn wait_for_stop(stop: &AtomicBool, mut report: impl FnMut()) {
    let mut last_stats = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        if last_stats.elapsed() >= STATS_INTERVAL {
            report();
            last_stats = Instant::now();
        }
        thread::sleep(FRAME_INTERVAL);
    }
}
