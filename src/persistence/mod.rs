//! # Persistence
//!
//! On-disk layout of a world:
//!
//! ```text
//! <save_root>/<world_name>/
//!     WorldConfig.json
//!     chunks/<x>_<y>_<z>.zst
//!     players/<player_id>.json
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into place, so a crash
//! mid-write leaves the previous version intact.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub mod chunk_codec;
pub mod chunk_store;
pub mod player_state;
pub mod world_config;

pub use chunk_store::ChunkStore;
pub use player_state::{GameMode, PlayerState};
pub use world_config::WorldConfig;

/// Reads a file, mapping "not found" to `None`.
pub(crate) fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Writes `data` to `path` through a uniquely named temporary file.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("path has no parent: {}", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!("{}.{:016x}.tmp", file_name, fastrand::u64(..)));
    fs::write(&tmp_path, data)?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

pub(crate) fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match read_optional(path)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data)?;
    Ok(())
}
