//! World metadata stored in `<world>/WorldConfig.json`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

use super::{read_json_optional, write_json_atomic};

pub const WORLD_CONFIG_FILE: &str = "WorldConfig.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    /// Creation time, in seconds since the Unix epoch.
    pub created_at: u64,
    pub seed: u32,
    /// Crate version that created the world.
    pub version: String,
}

impl WorldConfig {
    /// Creates metadata for a brand new world with a random seed.
    pub fn fresh() -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        WorldConfig {
            created_at,
            seed: fastrand::u32(..),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn path(world_dir: &Path) -> PathBuf {
        world_dir.join(WORLD_CONFIG_FILE)
    }

    /// Reads the world metadata, creating and writing it on first open.
    pub fn load_or_create(world_dir: &Path) -> Result<Self, StoreError> {
        let path = Self::path(world_dir);
        if let Some(config) = read_json_optional::<WorldConfig>(&path)? {
            return Ok(config);
        }
        let config = Self::fresh();
        write_json_atomic(&path, &config)?;
        info!(
            "Created world at {} with seed {}",
            world_dir.display(),
            config.seed
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_open_creates_and_second_open_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let world_dir = dir.path().join("w");

        let created = WorldConfig::load_or_create(&world_dir).unwrap();
        assert!(world_dir.join(WORLD_CONFIG_FILE).is_file());
        assert_eq!(created.version, env!("CARGO_PKG_VERSION"));

        let reopened = WorldConfig::load_or_create(&world_dir).unwrap();
        assert_eq!(created, reopened);
    }

    #[test]
    fn file_uses_camel_case_keys() {
        let json = serde_json::to_string(&WorldConfig {
            created_at: 5,
            seed: 9,
            version: "1".into(),
        })
        .unwrap();
        assert!(json.contains("\"createdAt\":5"));
    }
}
