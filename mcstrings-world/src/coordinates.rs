//! Chunk and region coordinate math.
//!
//! A region holds 32x32 chunks. Chunk `(x, z)` lives in region
//! `(x div 32, z div 32)` at local slot `(x mod 32, z mod 32)` with flooring
//! semantics, so negative coordinates wrap forward into `0..32`.

use std::fmt;

/// Number of chunks per region dimension.
pub const REGION_SIZE: i32 = 32;

/// World-absolute chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The region containing this chunk.
    pub fn region(self) -> RegionPos {
        RegionPos::new(self.x.div_euclid(REGION_SIZE), self.z.div_euclid(REGION_SIZE))
    }

    /// Local coordinates within the region, each in `0..32`.
    pub fn local(self) -> (i32, i32) {
        (self.x.rem_euclid(REGION_SIZE), self.z.rem_euclid(REGION_SIZE))
    }

    /// Index of this chunk's slot in the region's location table (0-1023).
    pub fn slot_index(self) -> usize {
        let (dx, dz) = self.local();
        (dz * REGION_SIZE + dx) as usize
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Region coordinates, as they appear in region file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn file_name(self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parses a region file name like `r.0.-1.mca`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }

    /// The world coordinates of the chunk at location-table `index`.
    pub fn chunk_at(self, index: usize) -> ChunkPos {
        let dx = (index as i32) % REGION_SIZE;
        let dz = (index as i32) / REGION_SIZE;
        ChunkPos::new(self.x * REGION_SIZE + dx, self.z * REGION_SIZE + dz)
    }
}
