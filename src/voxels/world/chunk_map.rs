//! # Chunk Map
//!
//! The table of resident chunks plus the set of coordinates currently in flight through
//! the pipeline. A coordinate is in at most one of the two at any time: it leaves the
//! pending set when its chunk is published into the map.
//!
//! The map lives behind a single mutex owned by the world. Never take that mutex while
//! holding the lock of a chunk; clone the handles out first.

use std::collections::{HashMap, HashSet};

use crate::core::MtResource;
use crate::voxels::block::BlockSide;
use crate::voxels::chunk::Chunk;
use crate::voxels::coordinate::ChunkCoordinate;

#[derive(Default)]
pub struct ChunkMap {
    resident: HashMap<ChunkCoordinate, MtResource<Chunk>>,
    pending: HashSet<ChunkCoordinate>,
}

impl ChunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `coordinate` for the pipeline.
    ///
    /// # Returns
    /// `false` if the coordinate is already resident or pending.
    pub fn mark_pending(&mut self, coordinate: ChunkCoordinate) -> bool {
        if self.resident.contains_key(&coordinate) {
            return false;
        }
        self.pending.insert(coordinate)
    }

    /// Drops a pending claim. A chunk for it that is still in flight will be discarded
    /// when it reaches the map.
    pub fn release_pending(&mut self, coordinate: ChunkCoordinate) -> bool {
        self.pending.remove(&coordinate)
    }

    pub fn is_pending(&self, coordinate: ChunkCoordinate) -> bool {
        self.pending.contains(&coordinate)
    }

    pub fn is_resident(&self, coordinate: ChunkCoordinate) -> bool {
        self.resident.contains_key(&coordinate)
    }

    /// Resident or pending.
    pub fn is_known(&self, coordinate: ChunkCoordinate) -> bool {
        self.is_resident(coordinate) || self.is_pending(coordinate)
    }

    /// Publishes a finished chunk and clears its pending claim.
    ///
    /// # Returns
    /// The handle of the now resident chunk.
    pub fn insert_resident(&mut self, chunk: Chunk) -> MtResource<Chunk> {
        let coordinate = chunk.coordinate;
        self.pending.remove(&coordinate);
        let handle = MtResource::new(chunk);
        self.resident.insert(coordinate, handle.clone());
        handle
    }

    pub fn remove_resident(&mut self, coordinate: ChunkCoordinate) -> Option<MtResource<Chunk>> {
        self.resident.remove(&coordinate)
    }

    pub fn get(&self, coordinate: ChunkCoordinate) -> Option<MtResource<Chunk>> {
        self.resident.get(&coordinate).cloned()
    }

    /// Handles of the resident chunks across each face of `coordinate`, in
    /// [`BlockSide`] order.
    pub fn neighbors(&self, coordinate: ChunkCoordinate) -> [Option<MtResource<Chunk>>; 6] {
        let mut neighbors: [Option<MtResource<Chunk>>; 6] = Default::default();
        for side in BlockSide::all() {
            let (dx, dy, dz) = side.offset();
            neighbors[side as usize] = self.get(coordinate.offset(dx, dy, dz));
        }
        neighbors
    }

    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn resident_coordinates(&self) -> Vec<ChunkCoordinate> {
        self.resident.keys().copied().collect()
    }

    pub fn pending_coordinates(&self) -> Vec<ChunkCoordinate> {
        self.pending.iter().copied().collect()
    }

    pub fn resident_handles(&self) -> Vec<MtResource<Chunk>> {
        self.resident.values().cloned().collect()
    }

    /// Removes every resident chunk and every pending claim.
    ///
    /// # Returns
    /// The handles that were resident.
    pub fn drain(&mut self) -> Vec<MtResource<Chunk>> {
        self.pending.clear();
        self.resident.drain().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_coordinate_is_pending_or_resident_never_both() {
        let mut map = ChunkMap::new();
        let coordinate = ChunkCoordinate::new(1, 0, 1);

        assert!(map.mark_pending(coordinate));
        assert!(!map.mark_pending(coordinate));
        assert!(map.is_pending(coordinate) && !map.is_resident(coordinate));

        let handle = map.insert_resident(Chunk::new(coordinate));
        assert!(map.is_resident(coordinate) && !map.is_pending(coordinate));
        assert!(map.get(coordinate).unwrap().ptr_eq(&handle));
        assert!(!map.mark_pending(coordinate));
        assert_eq!((map.resident_len(), map.pending_len()), (1, 0));
    }

    #[test]
    fn released_claims_can_be_taken_again() {
        let mut map = ChunkMap::new();
        let coordinate = ChunkCoordinate::new(0, 0, 0);
        map.mark_pending(coordinate);
        assert!(map.release_pending(coordinate));
        assert!(!map.is_known(coordinate));
        assert!(map.mark_pending(coordinate));
    }

    #[test]
    fn neighbors_follow_block_side_order() {
        let mut map = ChunkMap::new();
        let center = ChunkCoordinate::new(0, 0, 0);
        map.insert_resident(Chunk::new(center.offset(1, 0, 0)));
        map.insert_resident(Chunk::new(center.offset(0, -1, 0)));

        let neighbors = map.neighbors(center);
        assert!(neighbors[BlockSide::RIGHT as usize].is_some());
        assert!(neighbors[BlockSide::BOTTOM as usize].is_some());
        assert_eq!(neighbors.iter().flatten().count(), 2);
        assert_eq!(
            neighbors[BlockSide::RIGHT as usize].as_ref().unwrap().get().coordinate,
            center.offset(1, 0, 0)
        );
    }

    #[test]
    fn drain_empties_both_sets() {
        let mut map = ChunkMap::new();
        map.insert_resident(Chunk::new(ChunkCoordinate::new(0, 0, 0)));
        map.mark_pending(ChunkCoordinate::new(0, 1, 0));

        assert_eq!(map.drain().len(), 1);
        assert_eq!((map.resident_len(), map.pending_len()), (0, 0));
    }
}
