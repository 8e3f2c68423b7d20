//! The three dimensions of a world and where their region files live.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Fixed scan order: overworld, nether, the end.
    pub const ALL: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

    /// The numeric id used in save data and in CSV rows.
    pub const fn index(self) -> i32 {
        match self {
            Dimension::Overworld => 0,
            Dimension::Nether => -1,
            Dimension::End => 1,
        }
    }

    pub const fn from_index(index: i32) -> Option<Dimension> {
        match index {
            0 => Some(Dimension::Overworld),
            -1 => Some(Dimension::Nether),
            1 => Some(Dimension::End),
            _ => None,
        }
    }

    /// The directory holding this dimension's region files. May not exist;
    /// an absent directory means the dimension has no chunks.
    pub fn region_dir(self, world: &Path) -> PathBuf {
        match self {
            Dimension::Overworld => world.join("region"),
            Dimension::Nether => world.join("DIM-1").join("region"),
            Dimension::End => world.join("DIM1").join("region"),
        }
    }
}
