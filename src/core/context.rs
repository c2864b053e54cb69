//! # Engine Context
//!
//! Everything the world pipeline needs from the outside, constructed once at process
//! start and shared by handle with every worker thread:
//!
//! - the [`EngineConfig`] the process was started with
//! - the [`BlockRegistry`] consulted while meshing
//! - the [`TerrainSource`] consulted while generating
//! - the [`ChunkStore`] of the world being streamed
//! - the network [`Client`], when the process is online
//!
//! Nothing here is global; tests build a context with whatever collaborators they need.

use std::sync::Arc;

use log::info;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::network::Client;
use crate::persistence::{ChunkStore, WorldConfig};
use crate::voxels::block::BlockRegistry;
use crate::voxels::terrain::{NoiseTerrain, TerrainSource};

pub struct EngineContext {
    pub config: EngineConfig,
    pub registry: BlockRegistry,
    pub terrain: Box<dyn TerrainSource>,
    pub store: ChunkStore,
    pub client: Option<Client>,
}

impl EngineContext {
    /// Assembles a context from explicit collaborators.
    pub fn new(
        config: EngineConfig,
        registry: BlockRegistry,
        terrain: Box<dyn TerrainSource>,
        client: Option<Client>,
    ) -> Arc<Self> {
        let store = ChunkStore::new(&config.save_root, &config.world_name);
        Arc::new(EngineContext {
            config,
            registry,
            terrain,
            store,
            client,
        })
    }

    /// Opens the world named in `config`: reads (or creates) its metadata and seeds the
    /// noise terrain from it, unless the config overrides the seed.
    ///
    /// # Arguments
    /// * `config` - Validated process configuration
    /// * `client` - The connection to the server, for online roles
    pub fn open(config: EngineConfig, client: Option<Client>) -> Result<Arc<Self>, EngineError> {
        let store = ChunkStore::new(&config.save_root, &config.world_name);
        let world = WorldConfig::load_or_create(store.world_dir())?;
        let seed = config.seed.unwrap_or(world.seed);
        info!(
            "Opened world {} (created by {}, seed {})",
            config.world_name, world.version, seed
        );

        Ok(Self::new(
            config,
            BlockRegistry::with_default_blocks(),
            Box::new(NoiseTerrain::new(seed)),
            client,
        ))
    }

    /// Whether chunks are requested from and pushed to a server.
    pub fn is_online(&self) -> bool {
        self.client.is_some()
    }

    /// Whether evicted chunks are written to the local store.
    pub fn is_authoritative(&self) -> bool {
        self.config.role.is_authoritative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::terrain::FlatTerrain;

    #[test]
    fn open_creates_world_metadata_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            save_root: dir.path().to_path_buf(),
            world_name: "meta".into(),
            ..EngineConfig::default()
        };

        let first = EngineContext::open(config.clone(), None).unwrap();
        let created = WorldConfig::load_or_create(first.store.world_dir()).unwrap();
        drop(first);

        EngineContext::open(config, None).unwrap();
        let reopened = WorldConfig::load_or_create(&dir.path().join("meta")).unwrap();
        assert_eq!(created, reopened);
    }

    #[test]
    fn offline_context_is_authoritative_and_not_online() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            save_root: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let context = EngineContext::new(
            config,
            BlockRegistry::with_default_blocks(),
            Box::new(FlatTerrain::new(10.0)),
            None,
        );
        assert!(context.is_authoritative());
        assert!(!context.is_online());
        assert_eq!(context.terrain.height_at(5, -5), 10.0);
    }
}
