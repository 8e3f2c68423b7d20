//! Applies string edits back into a world.
//!
//! The patcher keeps at most one chunk in memory. Edits for the loaded chunk
//! mutate it in place; an edit for a different chunk writes the loaded one
//! back first (only if it actually changed) and loads the new one. Edit
//! streams sorted by chunk therefore load and flush each chunk once, but
//! correctness does not depend on the order.

use std::path::PathBuf;

use mcstrings_nbt::path::{PathError, SetOutcome, TagPath};
use mcstrings_nbt::Nbt;
use thiserror::Error;

use crate::coordinates::ChunkPos;
use crate::dimension::Dimension;
use crate::extract::StringRow;
use crate::region::{
    ChunkPayload, ChunkReadingError, ChunkWritingError, Compression, RegionFile,
};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid dimension: {0}")]
    InvalidDimension(i32),
    #[error("cannot open region file {} for reading: {}", .path.display(), .source)]
    OpenRegion {
        path: PathBuf,
        source: ChunkReadingError,
    },
    #[error("cannot read chunk {at} in {}: {}", .path.display(), .source)]
    Read {
        at: ChunkPos,
        path: PathBuf,
        source: ChunkReadingError,
    },
    #[error("cannot open region file {} for writing: {}", .path.display(), .source)]
    OpenForWrite {
        path: PathBuf,
        source: ChunkReadingError,
    },
    #[error("saving chunk {at} to {}: {}", .path.display(), .source)]
    Write {
        at: ChunkPos,
        path: PathBuf,
        source: ChunkWritingError,
    },
    #[error("{0}")]
    Path(PathError),
}

struct LoadedChunk {
    dimension: Dimension,
    at: ChunkPos,
    tree: Nbt,
    compression: Option<Compression>,
    updates: u32,
}

/// Patches string edits into the world rooted at `world`.
pub struct Patcher {
    world: PathBuf,
    chunk: Option<LoadedChunk>,
    should_compact: bool,
}

impl Patcher {
    pub fn new(world: PathBuf) -> Self {
        Patcher {
            world,
            chunk: None,
            should_compact: false,
        }
    }

    /// Applies a single edit. Fails when the chunk cannot be loaded or the
    /// path does not resolve to a string tag; the caller is expected to treat
    /// either as fatal.
    pub fn apply(&mut self, row: &StringRow) -> Result<(), PatchError> {
        let at = ChunkPos::new(row.chunk_x, row.chunk_z);
        self.load_chunk(row.dimension, at)?;

        let chunk = self
            .chunk
            .as_mut()
            .expect("load_chunk leaves a chunk loaded");
        let path = TagPath::parse(&row.nbt_path).map_err(PatchError::Path)?;
        let outcome = path
            .assign_string(chunk.tree.as_mut(), &row.value)
            .map_err(PatchError::Path)?;
        if outcome == SetOutcome::Replaced {
            chunk.updates += 1;
        }
        Ok(())
    }

    /// Flushes the loaded chunk and reports whether any chunk was resized or
    /// relocated during the run, in which case compaction is recommended.
    pub fn finish(mut self) -> Result<bool, PatchError> {
        self.save_chunk()?;
        Ok(self.should_compact)
    }

    /// Makes `(dimension, at)` the loaded chunk, saving the previously
    /// loaded chunk first if it is a different one.
    fn load_chunk(&mut self, dimension_index: i32, at: ChunkPos) -> Result<(), PatchError> {
        if self
            .chunk
            .as_ref()
            .is_some_and(|chunk| chunk.dimension.index() == dimension_index && chunk.at == at)
        {
            return Ok(());
        }
        // The previous chunk's edits are committed even when this record
        // turns out to be unloadable.
        self.save_chunk()?;

        let dimension = Dimension::from_index(dimension_index)
            .ok_or(PatchError::InvalidDimension(dimension_index))?;
        let path = dimension
            .region_dir(&self.world)
            .join(at.region().file_name());
        log::debug!(
            "loading dimension {}, chunk {} from {:?}",
            dimension.index(),
            at,
            path
        );
        let mut region = RegionFile::open(&path).map_err(|source| PatchError::OpenRegion {
            path: path.clone(),
            source,
        })?;
        let (compression, tree) = region
            .read_chunk(at.slot_index())
            .map_err(|source| PatchError::Read {
                at,
                path: path.clone(),
                source,
            })?
            .ok_or(PatchError::Read {
                at,
                path,
                source: ChunkReadingError::ChunkNotExist,
            })?;

        self.chunk = Some(LoadedChunk {
            dimension,
            at,
            tree,
            compression,
            updates: 0,
        });
        Ok(())
    }

    /// Writes the loaded chunk back if it has updates; a clean chunk is
    /// discarded without touching the file.
    fn save_chunk(&mut self) -> Result<(), PatchError> {
        let Some(chunk) = self.chunk.take() else {
            return Ok(());
        };
        if chunk.updates == 0 {
            return Ok(());
        }

        let path = chunk
            .dimension
            .region_dir(&self.world)
            .join(chunk.at.region().file_name());
        log::debug!(
            "saving dimension {}, chunk {} to {:?} with {} updates",
            chunk.dimension.index(),
            chunk.at,
            path,
            chunk.updates
        );

        let mut region =
            RegionFile::open_rw(&path).map_err(|source| PatchError::OpenForWrite {
                path: path.clone(),
                source,
            })?;
        let payload = ChunkPayload::from_tree(&chunk.tree, chunk.compression).map_err(|source| {
            PatchError::Write {
                at: chunk.at,
                path: path.clone(),
                source,
            }
        })?;
        let resized = region
            .write_chunk(chunk.at.slot_index(), &payload)
            .map_err(|source| PatchError::Write {
                at: chunk.at,
                path,
                source,
            })?;
        if resized {
            self.should_compact = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coordinates::RegionPos;
    use crate::extract::test::extract_all;
    use crate::test_support::{text_chunk, write_world_region};
    use tempfile::TempDir;

    fn row(dimension: i32, chunk_x: i32, chunk_z: i32, nbt_path: &str, value: &str) -> StringRow {
        StringRow {
            dimension,
            chunk_x,
            chunk_z,
            nbt_path: nbt_path.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn patch_rewrites_one_leaf_and_nothing_else() {
        let dir = TempDir::new().unwrap();
        write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, -1),
            &[(
                ChunkPos::new(5, -3).slot_index(),
                text_chunk(r#"{"text":"Hello"}"#),
                Some(Compression::ZLib),
            )],
        );
        let before = extract_all(dir.path());

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        patcher
            .apply(&row(
                0,
                5,
                -3,
                "block_entities[0]/Text1",
                r#"{"text":"Redacted"}"#,
            ))
            .unwrap();
        assert!(!patcher.finish().unwrap());

        let after = extract_all(dir.path());
        assert_eq!(after.len(), before.len());
        for (was, is) in before.iter().zip(&after) {
            if is.nbt_path == "block_entities[0]/Text1" {
                assert_eq!(is.value, r#"{"text":"Redacted"}"#);
            } else {
                assert_eq!(was, is);
            }
        }
    }

    #[test]
    fn feeding_extract_output_back_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[
                (0, text_chunk("one"), Some(Compression::ZLib)),
                (1, text_chunk("two"), Some(Compression::GZip)),
            ],
        );
        let bytes_before = std::fs::read(&path).unwrap();

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        for row in extract_all(dir.path()) {
            patcher.apply(&row).unwrap();
        }
        assert!(!patcher.finish().unwrap());

        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
    }

    #[test]
    fn round_trip_extract_patch_extract_is_stable() {
        let dir = TempDir::new().unwrap();
        write_world_region(
            dir.path(),
            Dimension::Nether,
            RegionPos::new(-1, 0),
            &[(
                ChunkPos::new(-30, 7).slot_index(),
                text_chunk("stable"),
                Some(Compression::GZip),
            )],
        );

        let first = extract_all(dir.path());
        let mut patcher = Patcher::new(dir.path().to_path_buf());
        for row in &first {
            patcher.apply(row).unwrap();
        }
        patcher.finish().unwrap();

        assert_eq!(extract_all(dir.path()), first);
    }

    #[test]
    fn growth_sets_the_compaction_advisory() {
        let dir = TempDir::new().unwrap();
        let path = write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[
                (0, text_chunk("padme"), None),
                (1, text_chunk("anchor"), None),
            ],
        );
        let len_before = std::fs::metadata(&path).unwrap().len();

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        patcher
            .apply(&row(
                0,
                0,
                0,
                "block_entities[0]/Text1",
                &"long ".repeat(2000),
            ))
            .unwrap();
        assert!(patcher.finish().unwrap());

        let len_after = std::fs::metadata(&path).unwrap().len();
        assert!(len_after > len_before);
        assert_eq!(len_after % 4096, 0);

        let rows = extract_all(dir.path());
        let edited = rows
            .iter()
            .find(|r| r.chunk_x == 0 && r.nbt_path == "block_entities[0]/Text1")
            .unwrap();
        assert_eq!(edited.value, "long ".repeat(2000));
    }

    #[test]
    fn same_value_patch_does_not_touch_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[(0, text_chunk("same"), Some(Compression::ZLib))],
        );
        let bytes_before = std::fs::read(&path).unwrap();

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        patcher
            .apply(&row(0, 0, 0, "block_entities[0]/Text1", "same"))
            .unwrap();
        assert!(!patcher.finish().unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
    }

    #[test]
    fn bad_path_fails_and_leaves_the_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[(0, text_chunk("untouched"), Some(Compression::ZLib))],
        );
        let bytes_before = std::fs::read(&path).unwrap();

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        let err = patcher
            .apply(&row(0, 0, 0, "nonexistent/key", "x"))
            .unwrap_err();
        assert!(matches!(err, PatchError::Path(PathError::MissingKey(_))));
        drop(patcher);

        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
    }

    #[test]
    fn unknown_dimension_is_rejected() {
        let mut patcher = Patcher::new(PathBuf::from("/nonexistent"));
        let err = patcher.apply(&row(2, 0, 0, "a", "b")).unwrap_err();
        assert!(matches!(err, PatchError::InvalidDimension(2)));
    }

    #[test]
    fn missing_chunk_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[(0, text_chunk("present"), Some(Compression::ZLib))],
        );

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        let err = patcher.apply(&row(0, 9, 9, "a", "b")).unwrap_err();
        assert!(matches!(
            err,
            PatchError::Read {
                source: ChunkReadingError::ChunkNotExist,
                ..
            }
        ));
    }

    #[test]
    fn chunk_affinity_flushes_on_change() {
        let dir = TempDir::new().unwrap();
        write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[
                (0, text_chunk("first"), Some(Compression::ZLib)),
                (1, text_chunk("second"), Some(Compression::ZLib)),
            ],
        );

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        patcher
            .apply(&row(0, 0, 0, "block_entities[0]/Text1", "first edited"))
            .unwrap();
        // Switching chunks flushes the first edit before loading the second.
        patcher
            .apply(&row(0, 1, 0, "block_entities[0]/Text1", "second edited"))
            .unwrap();
        patcher.finish().unwrap();

        let rows = extract_all(dir.path());
        let texts: Vec<&str> = rows
            .iter()
            .filter(|r| r.nbt_path == "block_entities[0]/Text1")
            .map(|r| r.value.as_str())
            .collect();
        assert_eq!(texts, vec!["first edited", "second edited"]);
    }

    #[test]
    fn compression_is_preserved_across_a_patch() {
        let dir = TempDir::new().unwrap();
        let path = write_world_region(
            dir.path(),
            Dimension::Overworld,
            RegionPos::new(0, 0),
            &[(0, text_chunk("gz"), Some(Compression::GZip))],
        );

        let mut patcher = Patcher::new(dir.path().to_path_buf());
        patcher
            .apply(&row(0, 0, 0, "block_entities[0]/Text1", "gz edited"))
            .unwrap();
        patcher.finish().unwrap();

        let mut region = RegionFile::open(&path).unwrap();
        let (compression, _) = region.read_chunk(0).unwrap().unwrap();
        assert_eq!(compression, Some(Compression::GZip));
    }
}
