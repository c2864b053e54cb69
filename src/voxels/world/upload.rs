//! # Mesh Upload
//!
//! The boundary between the streaming pipeline and the renderer. The render thread
//! implements [`MeshUploader`] on top of its graphics context; the world calls it from
//! [`World::upload_chunk_meshes`](super::World::upload_chunk_meshes), which must run on
//! that same thread.

use std::collections::HashMap;

use log::trace;

use crate::error::UploadError;
use crate::voxels::chunk::{ChunkMesh, MeshHandle, Vertex};
use crate::voxels::coordinate::ChunkCoordinate;

/// Turns finished chunk meshes into GPU-resident buffers.
pub trait MeshUploader {
    /// Uploads the live buffers of `mesh`.
    ///
    /// # Returns
    /// A handle the world keeps on the mesh and passes back to [`MeshUploader::release`]
    /// when the buffers are no longer needed.
    fn upload(&mut self, coordinate: ChunkCoordinate, mesh: &ChunkMesh) -> Result<MeshHandle, UploadError>;

    /// Frees the buffers behind `handle`.
    fn release(&mut self, handle: MeshHandle);
}

/// An uploader without a GPU, for servers and tests. It records what would have been
/// uploaded.
#[derive(Debug, Default)]
pub struct HeadlessUploader {
    next_handle: u64,
    live: HashMap<MeshHandle, (ChunkCoordinate, usize)>,
    uploads: usize,
    releases: usize,
}

impl HeadlessUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of meshes currently held.
    pub fn live_meshes(&self) -> usize {
        self.live.len()
    }

    /// Bytes of vertex and index data currently held.
    pub fn live_bytes(&self) -> usize {
        self.live.values().map(|(_, bytes)| bytes).sum()
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Coordinate of the chunk `handle` was issued for, if still live.
    pub fn coordinate_of(&self, handle: MeshHandle) -> Option<ChunkCoordinate> {
        self.live.get(&handle).map(|(coordinate, _)| *coordinate)
    }
}

impl MeshUploader for HeadlessUploader {
    fn upload(&mut self, coordinate: ChunkCoordinate, mesh: &ChunkMesh) -> Result<MeshHandle, UploadError> {
        let bytes = mesh.vertices.len() * Vertex::SIZE + mesh.indices.len() * 4;
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, (coordinate, bytes));
        self.uploads += 1;
        trace!("Uploaded {} bytes for chunk {} as {:?}", bytes, coordinate, handle);
        Ok(handle)
    }

    fn release(&mut self, handle: MeshHandle) {
        if self.live.remove(&handle).is_some() {
            self.releases += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_released_once() {
        let mut uploader = HeadlessUploader::new();
        let mesh = ChunkMesh::new();
        let first = uploader.upload(ChunkCoordinate::new(0, 0, 0), &mesh).unwrap();
        let second = uploader.upload(ChunkCoordinate::new(1, 0, 0), &mesh).unwrap();
        assert_ne!(first, second);
        assert_eq!(uploader.live_meshes(), 2);

        uploader.release(first);
        uploader.release(first);
        assert_eq!(uploader.releases(), 1);
        assert_eq!(uploader.coordinate_of(second), Some(ChunkCoordinate::new(1, 0, 0)));
        assert_eq!(uploader.coordinate_of(first), None);
    }
}
