//! Removes orphaned sectors from region files.
//!
//! In-place chunk writes can strand sectors that no location entry points at
//! anymore (after a chunk shrinks or is relocated to the end of the file).
//! Compaction renumbers the live sectors to be contiguous, rewrites the
//! location table, and truncates the file. Running it on an already compact
//! file changes nothing.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::dimension::Dimension;
use crate::extract::{region_files, ExtractError};
use crate::region::{ChunkLocation, CHUNK_COUNT, SECTOR_BYTES};

#[derive(Error, Debug)]
pub enum CompactionError {
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("cannot read chunk locations")]
    InvalidHeader,
    #[error("found overlapping sectors in region file")]
    OverlappingSectors,
    #[error("cannot relocate sector later in file")]
    BackwardRelocation,
    #[error("cannot find new location for sector {0}")]
    MissingRelocation(u64),
    #[error("{0}")]
    Layout(ExtractError),
    #[error("{0} region file(s) could not be compacted")]
    Failed(usize),
}

/// Compacts every region file in the world.
///
/// A file that cannot be compacted is left as it was (its allocation table
/// is only rewritten after every sector copy has succeeded) and reported,
/// but does not stop the remaining files from being processed.
pub fn compact_world(world: &Path) -> Result<(), CompactionError> {
    let mut failures = 0;
    for dimension in Dimension::ALL {
        failures += compact_dimension(&dimension.region_dir(world))?;
    }
    if failures > 0 {
        return Err(CompactionError::Failed(failures));
    }
    Ok(())
}

fn compact_dimension(dir: &Path) -> Result<usize, CompactionError> {
    let mut failures = 0;
    for (_, path) in region_files(dir).map_err(CompactionError::Layout)? {
        if let Err(err) = compact_region(&path) {
            log::error!("region file {:?}: {}", path, err);
            failures += 1;
        }
    }
    Ok(failures)
}

/// Compacts a single region file, returning the number of bytes removed.
pub fn compact_region(path: &Path) -> Result<u64, CompactionError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(CompactionError::Io)?;
    let len_before = file.metadata().map_err(CompactionError::Io)?.len();

    let mut table = [0u8; SECTOR_BYTES];
    file.read_exact(&mut table).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            CompactionError::InvalidHeader
        } else {
            CompactionError::Io(err)
        }
    })?;
    let mut locations = [ChunkLocation::EMPTY; CHUNK_COUNT];
    for (index, entry) in table.chunks_exact(4).enumerate() {
        locations[index] =
            ChunkLocation::from_entry(u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]));
    }

    // The occupied sectors: the two header sectors plus every allocation.
    let mut occupied: Vec<u64> = vec![0, 1];
    let mut chunk_starts: HashSet<u64> = HashSet::new();
    for location in locations.iter().filter(|location| !location.is_empty()) {
        let start = location.start_sector();
        chunk_starts.insert(start);
        occupied.extend(start..start + location.sector_count());
    }
    occupied.sort_unstable();

    // A sector listed twice is claimed by two allocations; refuse to guess
    // which one owns the bytes.
    if occupied.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(CompactionError::OverlappingSectors);
    }

    // After sorting, the index of a sector in `occupied` is where it lands
    // after compaction. Slide each sector down, remembering where the chunk
    // starts went.
    let mut relocations: HashMap<u64, u64> = HashMap::new();
    let mut buf = vec![0u8; SECTOR_BYTES];
    for (new_sector, &old_sector) in occupied.iter().enumerate() {
        let new_sector = new_sector as u64;
        if chunk_starts.contains(&old_sector) {
            relocations.insert(old_sector, new_sector);
        }
        if new_sector > old_sector {
            return Err(CompactionError::BackwardRelocation);
        }
        if new_sector == old_sector {
            continue;
        }
        file.seek(SeekFrom::Start(old_sector * SECTOR_BYTES as u64))
            .map_err(CompactionError::Io)?;
        file.read_exact(&mut buf).map_err(CompactionError::Io)?;
        file.seek(SeekFrom::Start(new_sector * SECTOR_BYTES as u64))
            .map_err(CompactionError::Io)?;
        file.write_all(&buf).map_err(CompactionError::Io)?;
    }

    // Rewrite the location table with the new starts; counts are unchanged.
    for location in locations.iter_mut().filter(|location| !location.is_empty()) {
        let start = location.start_sector();
        let new_start = *relocations
            .get(&start)
            .ok_or(CompactionError::MissingRelocation(start))?;
        *location = ChunkLocation::new(new_start, location.sector_count());
    }
    for (index, location) in locations.iter().enumerate() {
        table[index * 4..index * 4 + 4].copy_from_slice(&location.entry().to_be_bytes());
    }
    file.seek(SeekFrom::Start(0)).map_err(CompactionError::Io)?;
    file.write_all(&table).map_err(CompactionError::Io)?;

    let len_after = occupied.len() as u64 * SECTOR_BYTES as u64;
    let removed = len_before.saturating_sub(len_after);
    if removed > 0 {
        log::info!("Removing {} bytes from region file {:?}.", removed, path);
    } else {
        log::debug!("Removing 0 bytes from region file {:?}.", path);
    }
    file.set_len(len_after).map_err(CompactionError::Io)?;

    Ok(removed)
}
