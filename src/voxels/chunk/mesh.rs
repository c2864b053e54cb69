//! # Chunk Mesh
//!
//! Vertex and index buffers derived from the visible faces of a chunk, plus the flags
//! that drive the meshing and upload stages.
//!
//! ## Double Buffering
//!
//! The first mesh of a chunk is written straight into the live buffers. A remesh of a
//! resident chunk is written into the staging buffers instead; the main thread swaps
//! them in during the upload step so a delayed upload never shows a half-written mesh.

/// A vertex of a chunk mesh.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Normal: [f32; 3] (12 bytes)
/// - Texture Coordinates: [f32; 2] (8 bytes)
///
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in world space
    pub position: [f32; 3],
    /// Outward face normal
    pub normal: [f32; 3],
    /// Texture atlas coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Size in bytes of one vertex in memory and on the wire.
    pub const SIZE: usize = std::mem::size_of::<Vertex>();

    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Vertex {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Opaque handle to GPU-resident mesh buffers, issued by a
/// [`MeshUploader`](crate::voxels::world::MeshUploader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Mesh buffers and state flags of one chunk.
#[derive(Debug, Clone)]
pub struct ChunkMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    staging_vertices: Vec<Vertex>,
    staging_indices: Vec<u32>,
    has_staged: bool,
    /// No visible faces; nothing to draw or upload.
    pub is_empty: bool,
    /// Block data changed since the mesh was last built.
    pub needs_update: bool,
    /// The live buffers are resident on the GPU.
    pub is_uploaded: bool,
    pub handle: Option<MeshHandle>,
}

impl ChunkMesh {
    /// Creates the mesh of an all-air chunk.
    pub fn new() -> Self {
        ChunkMesh {
            vertices: Vec::new(),
            indices: Vec::new(),
            staging_vertices: Vec::new(),
            staging_indices: Vec::new(),
            has_staged: false,
            is_empty: true,
            needs_update: false,
            is_uploaded: false,
            handle: None,
        }
    }

    /// Flags the mesh for rebuilding.
    pub fn mark_dirty(&mut self) {
        self.needs_update = true;
        self.is_empty = false;
    }

    /// Flags the mesh as having nothing to draw.
    pub fn mark_empty(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.is_empty = true;
        self.needs_update = false;
    }

    /// Replaces the live buffers.
    pub fn set_live(&mut self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        self.is_empty = indices.is_empty();
        self.vertices = vertices;
        self.indices = indices;
        self.needs_update = false;
        self.is_uploaded = false;
    }

    /// Writes a rebuilt mesh into the staging buffers, leaving the live buffers untouched.
    pub fn set_staged(&mut self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        self.staging_vertices = vertices;
        self.staging_indices = indices;
        self.has_staged = true;
        self.needs_update = false;
    }

    pub fn has_staged(&self) -> bool {
        self.has_staged
    }

    /// The most recently built geometry: the staging buffers while a remesh waits to be
    /// swapped in, the live buffers otherwise.
    pub fn latest_buffers(&self) -> (&[Vertex], &[u32]) {
        if self.has_staged {
            (&self.staging_vertices, &self.staging_indices)
        } else {
            (&self.vertices, &self.indices)
        }
    }

    /// Moves the staging buffers into the live buffers.
    ///
    /// # Returns
    /// `false` if nothing was staged.
    pub fn swap_staged(&mut self) -> bool {
        if !self.has_staged {
            return false;
        }
        self.vertices = std::mem::take(&mut self.staging_vertices);
        self.indices = std::mem::take(&mut self.staging_indices);
        self.has_staged = false;
        self.is_empty = self.indices.is_empty();
        self.is_uploaded = false;
        true
    }

    /// Number of quads in the live buffers.
    pub fn face_count(&self) -> usize {
        self.indices.len() / 6
    }
}

impl Default for ChunkMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(Vertex::SIZE, 32);
    }

    #[test]
    fn staged_buffers_only_appear_after_swap() {
        let mut mesh = ChunkMesh::new();
        mesh.set_live(vec![Vertex::default(); 4], vec![0, 2, 1, 0, 3, 2]);
        mesh.is_uploaded = true;

        mesh.set_staged(vec![Vertex::default(); 8], vec![0; 12]);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.is_uploaded);
        assert_eq!(mesh.latest_buffers().0.len(), 8);

        assert!(mesh.swap_staged());
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.is_uploaded);
        assert!(!mesh.swap_staged());
    }
}
