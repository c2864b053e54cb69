//! # Engine Configuration
//!
//! Settings for one engine process. Every field has a default, so a config file only
//! needs to list what it changes:
//!
//! ```json
//! { "role": "Host", "worldName": "survival", "viewDistance": 12 }
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::voxels::chunk::MissingNeighbor;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 55055;

/// Which parts of the networking stack a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// Single player; the local disk is authoritative.
    #[default]
    Offline,
    /// Requests chunks from a remote server and falls back to local generation.
    Client,
    /// Runs a server and a client in the same process.
    Host,
    /// Authoritative, disk-backed, no rendering.
    Server,
}

impl Role {
    /// Whether this process owns the save files of the world it streams.
    pub fn is_authoritative(self) -> bool {
        matches!(self, Role::Offline | Role::Server)
    }

    pub fn runs_server(self) -> bool {
        matches!(self, Role::Host | Role::Server)
    }

    pub fn runs_client(self) -> bool {
        matches!(self, Role::Client | Role::Host)
    }

    /// Whether this process streams a world around a local observer.
    pub fn runs_world(self) -> bool {
        !matches!(self, Role::Server)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub role: Role,
    pub world_name: String,
    pub save_root: PathBuf,
    pub player_name: String,
    /// Host name or address of the server, without the port.
    pub server_address: String,
    pub port: u16,
    /// Horizontal view radius, in chunks.
    pub view_distance: i32,
    pub min_chunk_y: i32,
    pub max_chunk_y: i32,
    /// Coordinates below this chunk layer are never generated.
    pub min_generatable_chunk_y: i32,
    pub generation_threads: usize,
    pub meshing_threads: usize,
    pub manager_tick_ms: u64,
    pub worker_idle_sleep_ms: u64,
    pub max_saves_per_tick: usize,
    pub max_uploads_per_frame: usize,
    pub missing_neighbor: MissingNeighbor,
    pub handshake_timeout_ms: u64,
    pub network_read_timeout_ms: u64,
    /// Capacity of the server's compressed chunk cache.
    pub chunk_cache_capacity: usize,
    /// Terrain seed override; the world's own seed is used when absent.
    pub seed: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(2, |n| n.get());
        let half = (workers / 2).max(1);
        EngineConfig {
            role: Role::Offline,
            world_name: "world".to_string(),
            save_root: PathBuf::from("saves"),
            player_name: "player".to_string(),
            server_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            view_distance: 8,
            min_chunk_y: -2,
            max_chunk_y: 10,
            min_generatable_chunk_y: -2,
            generation_threads: half,
            meshing_threads: half,
            manager_tick_ms: 4,
            worker_idle_sleep_ms: 2,
            max_saves_per_tick: 16,
            max_uploads_per_frame: 8,
            missing_neighbor: MissingNeighbor::Air,
            handshake_timeout_ms: 5000,
            network_read_timeout_ms: 2000,
            chunk_cache_capacity: 256,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = std::fs::read(path)?;
        let config: EngineConfig = serde_json::from_slice(&bytes)
            .map_err(|err| EngineError::Config(format!("{}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the world cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.view_distance < 0 {
            return Err(EngineError::Config("viewDistance must not be negative".into()));
        }
        if self.min_chunk_y > self.max_chunk_y {
            return Err(EngineError::Config(
                "minChunkY must not exceed maxChunkY".into(),
            ));
        }
        if self.generation_threads == 0 || self.meshing_threads == 0 {
            return Err(EngineError::Config("worker pools need at least one thread".into()));
        }
        if self.world_name.is_empty() || self.world_name.contains(['/', '\\']) {
            return Err(EngineError::Config(format!(
                "invalid world name {:?}",
                self.world_name
            )));
        }
        Ok(())
    }

    /// Resolves `server_address:port`.
    pub fn server_socket_addr(&self) -> Result<SocketAddr, EngineError> {
        (self.server_address.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| EngineError::Config(format!("cannot resolve {}", self.server_address)))
    }

    pub fn manager_tick(&self) -> Duration {
        Duration::from_millis(self.manager_tick_ms)
    }

    pub fn worker_idle_sleep(&self) -> Duration {
        Duration::from_millis(self.worker_idle_sleep_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn network_read_timeout(&self) -> Duration {
        Duration::from_millis(self.network_read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.port, 55055);
        assert_eq!(config.view_distance, 8);
        assert_eq!((config.min_chunk_y, config.max_chunk_y), (-2, 10));
        assert!(config.generation_threads >= 1);
        assert_eq!(config.missing_neighbor, MissingNeighbor::Air);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "role": "Host", "viewDistance": 3, "port": 6000 }"#).unwrap();
        assert_eq!(config.role, Role::Host);
        assert_eq!(config.view_distance, 3);
        assert_eq!(config.port, 6000);
        assert_eq!(config.world_name, "world");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = EngineConfig {
            min_chunk_y: 4,
            max_chunk_y: 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            world_name: "../escape".into(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn roles_split_responsibilities() {
        assert!(Role::Server.is_authoritative() && !Role::Server.runs_world());
        assert!(Role::Host.runs_server() && Role::Host.runs_client());
        assert!(!Role::Client.is_authoritative());
        assert!(Role::Offline.runs_world() && !Role::Offline.runs_client());
    }
}
