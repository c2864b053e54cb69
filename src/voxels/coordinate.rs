//! # Chunk Coordinates
//!
//! Integer positions on the chunk grid. One unit is [`CHUNK_DIMENSION`] world blocks,
//! so chunk `(1, 0, -1)` covers world blocks `16..32`, `0..16`, `-16..0`.

use std::fmt;

use cgmath::Point3;
use serde::{Deserialize, Serialize};

use super::chunk::CHUNK_DIMENSION;

/// Position of a chunk in chunk-grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk containing the given world-space point.
    pub fn from_world_position(position: Point3<f32>) -> Self {
        let size = CHUNK_DIMENSION as f32;
        Self::new(
            (position.x / size).floor() as i32,
            (position.y / size).floor() as i32,
            (position.z / size).floor() as i32,
        )
    }

    /// Returns the chunk containing the given world block.
    pub fn from_world_block(x: i32, y: i32, z: i32) -> Self {
        Self::new(
            x.div_euclid(CHUNK_DIMENSION),
            y.div_euclid(CHUNK_DIMENSION),
            z.div_euclid(CHUNK_DIMENSION),
        )
    }

    /// World-space block position of this chunk's `(0, 0, 0)` corner.
    pub fn world_origin(&self) -> Point3<i32> {
        Point3::new(
            self.x * CHUNK_DIMENSION,
            self.y * CHUNK_DIMENSION,
            self.z * CHUNK_DIMENSION,
        )
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Euclidean distance between two chunks, ignoring the vertical axis.
    pub fn horizontal_distance(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dz * dz).sqrt()
    }

    /// Full 3D Euclidean distance in chunk units.
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Chebyshev distance on the horizontal plane, which matches the square view area.
    pub fn horizontal_chebyshev(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// File stem used by the save layer: `<x>_<y>_<z>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }

    /// Parses a `<x>_<y>_<z>` file stem back into a coordinate.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let mut parts = stem.split('_').map(str::parse::<i32>);
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        let z = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(x, y, z))
    }
}

impl fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<Point3<i32>> for ChunkCoordinate {
    fn from(point: Point3<i32>) -> Self {
        Self::new(point.x, point.y, point.z)
    }
}
