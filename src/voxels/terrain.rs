//! # Terrain Sources
//!
//! Terrain height and biome are consumed as pure functions of the world column. Any
//! implementation of [`TerrainSource`] must be callable concurrently from every
//! generation worker.
//!
//! Two sources ship with the engine:
//! - [`FlatTerrain`]: a constant surface height, handy for tests and superflat worlds
//! - [`NoiseTerrain`]: rolling hills built from Perlin noise, seeded per world

use noise::{NoiseFn, Perlin};

/// Coarse climate classification of a world column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BiomeId {
    Plains,
    Desert,
    Mountains,
}

/// Provider of the terrain surface.
pub trait TerrainSource: Send + Sync {
    /// Height of the surface block at world column `(x, z)`.
    fn height_at(&self, world_x: i32, world_z: i32) -> f32;

    /// Biome of world column `(x, z)`.
    fn biome_at(&self, world_x: i32, world_z: i32) -> BiomeId;
}

/// A perfectly flat world.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    pub height: f32,
    pub biome: BiomeId,
}

impl FlatTerrain {
    pub fn new(height: f32) -> Self {
        FlatTerrain {
            height,
            biome: BiomeId::Plains,
        }
    }
}

impl TerrainSource for FlatTerrain {
    fn height_at(&self, _world_x: i32, _world_z: i32) -> f32 {
        self.height
    }

    fn biome_at(&self, _world_x: i32, _world_z: i32) -> BiomeId {
        self.biome
    }
}

/// Base surface height of [`NoiseTerrain`].
pub const NOISE_BASE_HEIGHT: f64 = 48.0;
/// Maximum deviation from the base height.
pub const NOISE_AMPLITUDE: f64 = 24.0;
/// Scaling factor applied to world coordinates when sampling height noise.
pub const NOISE_HEIGHT_SCALE: f64 = 0.01;
/// Scaling factor applied to world coordinates when sampling biome noise.
pub const NOISE_BIOME_SCALE: f64 = 0.002;

/// Perlin-noise terrain.
pub struct NoiseTerrain {
    height_noise: Perlin,
    detail_noise: Perlin,
    biome_noise: Perlin,
}

impl NoiseTerrain {
    pub fn new(seed: u32) -> Self {
        NoiseTerrain {
            height_noise: Perlin::new(seed),
            detail_noise: Perlin::new(seed.wrapping_add(1)),
            biome_noise: Perlin::new(seed.wrapping_add(2)),
        }
    }

    fn biome_sample(&self, world_x: i32, world_z: i32) -> f64 {
        self.biome_noise.get([
            world_x as f64 * NOISE_BIOME_SCALE,
            world_z as f64 * NOISE_BIOME_SCALE,
        ])
    }
}

impl TerrainSource for NoiseTerrain {
    fn height_at(&self, world_x: i32, world_z: i32) -> f32 {
        let (x, z) = (world_x as f64, world_z as f64);
        let base = self
            .height_noise
            .get([x * NOISE_HEIGHT_SCALE, z * NOISE_HEIGHT_SCALE]);
        let detail = self
            .detail_noise
            .get([x * NOISE_HEIGHT_SCALE * 4.0, z * NOISE_HEIGHT_SCALE * 4.0]);
        let amplitude = match self.biome_at(world_x, world_z) {
            BiomeId::Mountains => NOISE_AMPLITUDE * 2.5,
            BiomeId::Desert => NOISE_AMPLITUDE * 0.5,
            BiomeId::Plains => NOISE_AMPLITUDE,
        };
        (NOISE_BASE_HEIGHT + base * amplitude + detail * 4.0).floor() as f32
    }

    fn biome_at(&self, world_x: i32, world_z: i32) -> BiomeId {
        let sample = self.biome_sample(world_x, world_z);
        if sample > 0.3 {
            BiomeId::Mountains
        } else if sample < -0.3 {
            BiomeId::Desert
        } else {
            BiomeId::Plains
        }
    }
}
