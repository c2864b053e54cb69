//! Per-player state stored in `<world>/players/<player_id>.json`.

use std::path::{Path, PathBuf};

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

use super::chunk_store::PLAYERS_DIR;
use super::{read_json_optional, write_json_atomic};

/// Game mode of a player. The discriminant is also the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, FromPrimitive)]
pub enum GameMode {
    #[default]
    Survival = 0,
    Creative = 1,
    Spectator = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerState {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub game_mode: GameMode,
}

impl Default for PlayerState {
    fn default() -> Self {
        PlayerState {
            position: [0.0, 80.0, 0.0],
            yaw: 0.0,
            pitch: 0.0,
            game_mode: GameMode::Survival,
        }
    }
}

impl PlayerState {
    pub fn path(world_dir: &Path, player_id: &str) -> PathBuf {
        world_dir.join(PLAYERS_DIR).join(format!("{}.json", player_id))
    }

    /// Loads the saved state of `player_id`, or the default spawn state if none exists.
    pub fn load(world_dir: &Path, player_id: &str) -> Result<Self, StoreError> {
        Ok(read_json_optional(&Self::path(world_dir, player_id))?.unwrap_or_default())
    }

    pub fn save(&self, world_dir: &Path, player_id: &str) -> Result<(), StoreError> {
        write_json_atomic(&Self::path(world_dir, player_id), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_player_gets_default_state() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            PlayerState::load(dir.path(), "nobody").unwrap(),
            PlayerState::default()
        );
    }

    #[test]
    fn saved_state_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let state = PlayerState {
            position: [1.5, 70.0, -3.25],
            yaw: 90.0,
            pitch: -10.0,
            game_mode: GameMode::Creative,
        };
        state.save(dir.path(), "steve").unwrap();
        assert!(dir.path().join("players").join("steve.json").is_file());
        assert_eq!(PlayerState::load(dir.path(), "steve").unwrap(), state);
    }
}
