//! Streams every string tag in a world out as rows.
//!
//! Dimensions are scanned in fixed order, region files in file-name order,
//! and chunk slots in location-table order, so two extracts of the same
//! world produce identical output.

use std::io;
use std::path::{Path, PathBuf};

use mcstrings_nbt::walk;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinates::RegionPos;
use crate::dimension::Dimension;
use crate::region::{ChunkReadingError, RegionFile, CHUNK_COUNT};

/// A single extracted string: one CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRow {
    pub dimension: i32,
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub nbt_path: String,
    pub value: String,
}

/// Receives extracted rows. The extractor flushes after every chunk so that
/// a failure mid-world leaves a well-formed prefix behind.
pub trait RowSink {
    fn write_row(&mut self, row: &StringRow) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot read contents of directory {}: {}", .path.display(), .source)]
    ReadDir { path: PathBuf, source: io::Error },
    #[error("invalid region file name {}", .path.display())]
    InvalidRegionName { path: PathBuf },
    #[error("cannot open region file {}: {}", .path.display(), .source)]
    OpenRegion {
        path: PathBuf,
        source: ChunkReadingError,
    },
    #[error("cannot read chunk {index} in region file {}: {}", .path.display(), .source)]
    Chunk {
        path: PathBuf,
        index: usize,
        source: ChunkReadingError,
    },
    #[error("cannot write output: {0}")]
    Sink(io::Error),
}

/// Extracts every string tag in the world, passing each `(path, value)` pair
/// through `keep` before emitting it.
pub fn extract_world(
    world: &Path,
    keep: &dyn Fn(&str, &str) -> bool,
    sink: &mut dyn RowSink,
) -> Result<(), ExtractError> {
    for dimension in Dimension::ALL {
        extract_dimension(dimension, world, keep, sink)?;
    }
    Ok(())
}

fn extract_dimension(
    dimension: Dimension,
    world: &Path,
    keep: &dyn Fn(&str, &str) -> bool,
    sink: &mut dyn RowSink,
) -> Result<(), ExtractError> {
    let dir = dimension.region_dir(world);
    for (region, path) in region_files(&dir)? {
        extract_region(dimension, region, &path, keep, sink)?;
    }
    Ok(())
}

/// Lists the region files in a dimension directory in file-name order. An
/// absent directory is an empty dimension, not an error.
pub(crate) fn region_files(dir: &Path) -> Result<Vec<(RegionPos, PathBuf)>, ExtractError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(ExtractError::ReadDir {
                path: dir.to_path_buf(),
                source: err,
            })
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut files = Vec::new();
    for name in names {
        if !name.ends_with(".mca") {
            continue;
        }
        let path = dir.join(&name);
        let region = RegionPos::from_file_name(&name)
            .ok_or(ExtractError::InvalidRegionName { path: path.clone() })?;
        files.push((region, path));
    }
    Ok(files)
}

fn extract_region(
    dimension: Dimension,
    region: RegionPos,
    path: &Path,
    keep: &dyn Fn(&str, &str) -> bool,
    sink: &mut dyn RowSink,
) -> Result<(), ExtractError> {
    log::debug!("scanning region file {:?}", path);
    let mut file = RegionFile::open(path).map_err(|source| ExtractError::OpenRegion {
        path: path.to_path_buf(),
        source,
    })?;

    for index in 0..CHUNK_COUNT {
        let Some((_, tree)) = file.read_chunk(index).map_err(|source| ExtractError::Chunk {
            path: path.to_path_buf(),
            index,
            source,
        })?
        else {
            continue;
        };

        let at = region.chunk_at(index);
        let mut sink_error = None;
        walk::for_each_string_in(&tree.root_tag, |nbt_path, value| {
            if sink_error.is_some() || !keep(nbt_path, value) {
                return;
            }
            let row = StringRow {
                dimension: dimension.index(),
                chunk_x: at.x,
                chunk_z: at.z,
                nbt_path: nbt_path.to_string(),
                value: value.to_string(),
            };
            if let Err(err) = sink.write_row(&row) {
                sink_error = Some(err);
            }
        });
        if let Some(err) = sink_error {
            return Err(ExtractError::Sink(err));
        }
        sink.flush().map_err(ExtractError::Sink)?;
    }
    Ok(())
}
