//! Client and server talking over loopback sockets.

use std::net::UdpSocket;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use voxel_stream::config::{EngineConfig, Role};
use voxel_stream::core::EngineContext;
use voxel_stream::error::NetworkError;
use voxel_stream::network::framing::MAX_UDP_PAYLOAD;
use voxel_stream::network::{ChunkPayload, Client, FetchOutcome, PushKind, Server, Transport};
use voxel_stream::persistence::ChunkStore;
use voxel_stream::voxels::block::{BlockRegistry, DefaultBlock, AIR};
use voxel_stream::voxels::chunk::{Chunk, ChunkNeighborhood, MissingNeighbor, SavableChunk};
use voxel_stream::voxels::tasks::{ChunkGenerationTask, ChunkSource};
use voxel_stream::voxels::terrain::FlatTerrain;
use voxel_stream::voxels::world::{ChunkManager, World};
use voxel_stream::voxels::ChunkCoordinate;

const TIMEOUT: Duration = Duration::from_secs(5);

fn start_server(dir: &Path) -> Server {
    Server::start(
        "127.0.0.1:0".parse().unwrap(),
        ChunkStore::new(dir, "world"),
        16,
        TIMEOUT,
    )
    .unwrap()
}

fn connect(server: &Server, name: &str) -> Client {
    Client::connect(server.tcp_address(), name, TIMEOUT, TIMEOUT).unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn client_world(save_root: &Path, client: Client) -> World {
    let config = EngineConfig {
        role: Role::Client,
        save_root: save_root.to_path_buf(),
        view_distance: 0,
        min_chunk_y: 0,
        max_chunk_y: 0,
        min_generatable_chunk_y: 0,
        ..EngineConfig::default()
    };
    let context = EngineContext::new(
        config,
        BlockRegistry::with_default_blocks(),
        Box::new(FlatTerrain::new(20.0)),
        Some(client),
    );
    World::new(context)
}

/// A chunk of random blocks with its mesh, far too large for one datagram once
/// compressed.
fn noisy_chunk(coordinate: ChunkCoordinate) -> SavableChunk {
    let mut rng = fastrand::Rng::with_seed(7);
    let mut chunk = Chunk::new(coordinate);
    for z in 0..16 {
        for y in 0..16 {
            for x in 0..16 {
                chunk.set_block(x, y, z, rng.u16(0..9)).unwrap();
            }
        }
    }
    chunk.generate_mesh(
        &ChunkNeighborhood::isolated(MissingNeighbor::Air),
        &BlockRegistry::with_default_blocks(),
    );
    chunk.to_savable()
}

#[test]
fn chunks_generated_by_a_client_reach_the_server() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let server = start_server(server_dir.path());
    let world = client_world(client_dir.path(), connect(&server, "alice"));
    let shared = world.shared();

    let coordinate = ChunkCoordinate::new(5, 0, 5);
    assert!(shared.map.lock().mark_pending(coordinate));
    let generator = ChunkGenerationTask::new(shared.clone());
    assert_eq!(generator.process(coordinate), Some(ChunkSource::Generated));
    assert_eq!(shared.queues.meshing.len(), 1);
    assert_eq!(shared.queues.network_push.len(), 1);

    ChunkManager::new(shared.clone()).flush_network_pushes();
    assert!(shared.queues.network_push.is_empty());

    let server_store = ChunkStore::new(server_dir.path(), "world");
    assert!(wait_until(|| server_store.contains(coordinate)));
    let stored = server_store.load_chunk(coordinate).unwrap().unwrap();
    assert!(stored.blocks.iter().all(|&id| id == DefaultBlock::STONE.id()));
}

#[test]
fn stored_chunks_are_served_and_missing_ones_reported() {
    let dir = tempfile::tempdir().unwrap();
    let coordinate = ChunkCoordinate::new(-2, 1, 3);
    let saved = Chunk::filled(coordinate, DefaultBlock::SAND.id()).to_savable();
    ChunkStore::new(dir.path(), "world").save_chunk(&saved).unwrap();

    let server = start_server(dir.path());
    let client = connect(&server, "bob");

    match client.fetch_chunk(coordinate).unwrap() {
        FetchOutcome::Found(chunk) => assert_eq!(chunk.blocks, saved.blocks),
        FetchOutcome::NotFound => panic!("chunk {} should be found", coordinate),
    }
    assert_eq!(
        client.fetch_chunk(ChunkCoordinate::new(9, 9, 9)).unwrap(),
        FetchOutcome::NotFound
    );
    assert!(wait_until(|| server.player_names() == vec!["bob".to_string()]));
}

#[test]
fn concurrent_fetches_each_get_their_own_answer() {
    let dir = tempfile::tempdir().unwrap();
    let store = ChunkStore::new(dir.path(), "world");
    let coordinates: Vec<_> = (0..4).map(|x| ChunkCoordinate::new(x, 0, 0)).collect();
    for (offset, &coordinate) in coordinates.iter().enumerate() {
        let id = DefaultBlock::STONE.id() + offset as u16;
        store.save_chunk(&Chunk::filled(coordinate, id).to_savable()).unwrap();
    }

    let server = start_server(dir.path());
    let client = &connect(&server, "gina");
    thread::scope(|scope| {
        let fetches: Vec<_> = coordinates
            .iter()
            .map(|&coordinate| scope.spawn(move || (coordinate, client.fetch_chunk(coordinate))))
            .collect();
        for fetch in fetches {
            let (coordinate, outcome) = fetch.join().unwrap();
            let expected = DefaultBlock::STONE.id() + coordinate.x as u16;
            match outcome.unwrap() {
                FetchOutcome::Found(chunk) => {
                    assert_eq!(chunk.coordinate, coordinate);
                    assert!(chunk.blocks.iter().all(|&id| id == expected));
                }
                FetchOutcome::NotFound => panic!("chunk {} should be found", coordinate),
            }
        }
    });
}

#[test]
fn oversized_chunks_travel_over_tcp_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path());
    let client = connect(&server, "carol");
    assert!(wait_until(|| server.player_names().len() == 1));

    let coordinate = ChunkCoordinate::new(1, 2, 3);
    let chunk = noisy_chunk(coordinate);
    assert!(ChunkPayload::from_chunk(&chunk).compressed.len() > MAX_UDP_PAYLOAD);

    assert!(matches!(
        client.push_chunk(PushKind::Update, &chunk),
        Ok(Transport::Tcp)
    ));
    let store = ChunkStore::new(dir.path(), "world");
    assert!(wait_until(|| store.contains(coordinate)));

    match client.fetch_chunk(coordinate).unwrap() {
        FetchOutcome::Found(fetched) => {
            assert_eq!(fetched.blocks, chunk.blocks);
            assert_eq!(fetched.indices, chunk.indices);
        }
        FetchOutcome::NotFound => panic!("oversized chunk was not served"),
    }
}

#[test]
fn edits_are_relayed_to_the_other_clients() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let server = start_server(server_dir.path());
    let editor = connect(&server, "dave");
    let world = client_world(client_dir.path(), connect(&server, "erin"));
    assert!(wait_until(|| server.player_names().len() == 2));

    let coordinate = ChunkCoordinate::new(0, 0, 0);
    world
        .shared()
        .map
        .lock()
        .insert_resident(Chunk::filled(coordinate, DefaultBlock::STONE.id()));

    let mut edited = Chunk::filled(coordinate, DefaultBlock::STONE.id());
    edited.set_block(4, 5, 6, AIR).unwrap();
    assert!(matches!(
        editor.push_chunk(PushKind::Update, &edited.to_savable()),
        Ok(Transport::Udp)
    ));

    let mut manager = ChunkManager::new(world.shared().clone());
    assert!(wait_until(|| {
        manager.tick();
        world.get_block(4, 5, 6) == Some(AIR)
    }));
    assert_eq!(world.get_block(4, 5, 7), Some(DefaultBlock::STONE.id()));
    assert!(world.shared().queues.updates.drain_all().contains(&coordinate));

    thread::sleep(Duration::from_millis(200));
    assert!(editor.incoming_updates().is_empty());
    assert!(ChunkStore::new(server_dir.path(), "world").contains(coordinate));
}

#[test]
fn silent_servers_fail_the_handshake() {
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let address = silent.local_addr().unwrap();

    let started = Instant::now();
    let result = Client::connect(
        address,
        "frank",
        Duration::from_millis(300),
        Duration::from_millis(300),
    );
    assert!(matches!(result, Err(NetworkError::HandshakeTimeout(a)) if a == address));
    assert!(started.elapsed() < TIMEOUT);
}
