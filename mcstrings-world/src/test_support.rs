//! Builders for the synthetic region files used by the storage tests.

use std::path::Path;

use mcstrings_nbt::compound::NbtCompound;
use mcstrings_nbt::tag::NbtTag;
use mcstrings_nbt::Nbt;

use crate::region::{ChunkLocation, ChunkPayload, Compression, SECTOR_BYTES};

/// A chunk to place in a synthetic region file.
pub(crate) struct SeededChunk {
    pub slot: usize,
    pub start_sector: u64,
    pub tree: Nbt,
    pub compression: Option<Compression>,
}

/// A small chunk tree shaped like real save data: one sign block entity
/// holding `text`, plus a couple of non-string tags that must survive any
/// edit untouched.
pub(crate) fn text_chunk(text: &str) -> Nbt {
    let mut sign = NbtCompound::new();
    sign.put("id", "minecraft:sign");
    sign.put("Text1", NbtTag::String(text.to_string()));
    sign.put_int("x", 0);

    let mut root = NbtCompound::new();
    root.put_int("DataVersion", 3955);
    root.put(
        "block_entities",
        NbtTag::List(vec![NbtTag::Compound(sign)].into_boxed_slice()),
    );
    root.put(
        "heights",
        NbtTag::LongArray(vec![1, 2, 3].into_boxed_slice()),
    );
    Nbt::from(root)
}

/// Writes a region file with the given chunks at explicit sector offsets.
/// The file covers every seeded allocation; sectors nobody claims are left
/// zeroed, which is how orphans look on disk. Returns the file length.
pub(crate) fn write_region(path: &Path, chunks: &[SeededChunk]) -> u64 {
    let mut end_sector = 2u64;
    let mut placed = Vec::new();
    for chunk in chunks {
        let payload = ChunkPayload::from_tree(&chunk.tree, chunk.compression).unwrap();
        let mut stored = Vec::new();
        payload.write_to(&mut stored).unwrap();
        end_sector = end_sector.max(chunk.start_sector + payload.sector_count());
        placed.push((chunk.slot, chunk.start_sector, payload.sector_count(), stored));
    }

    let mut data = vec![0u8; end_sector as usize * SECTOR_BYTES];
    for (slot, start_sector, sector_count, stored) in placed {
        let entry = ChunkLocation::new(start_sector, sector_count).entry();
        data[slot * 4..slot * 4 + 4].copy_from_slice(&entry.to_be_bytes());
        let offset = start_sector as usize * SECTOR_BYTES;
        data[offset..offset + stored.len()].copy_from_slice(&stored);
    }

    std::fs::write(path, &data).unwrap();
    data.len() as u64
}

/// Lays out `chunks` back to back from sector 2 in a fresh world directory
/// structure, returning the region file path.
pub(crate) fn write_world_region(
    world: &Path,
    dimension: crate::dimension::Dimension,
    region: crate::coordinates::RegionPos,
    chunks: &[(usize, Nbt, Option<Compression>)],
) -> std::path::PathBuf {
    let dir = dimension.region_dir(world);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(region.file_name());

    let mut seeded = Vec::new();
    let mut next_sector = 2u64;
    for (slot, tree, compression) in chunks {
        let payload = ChunkPayload::from_tree(tree, *compression).unwrap();
        seeded.push(SeededChunk {
            slot: *slot,
            start_sector: next_sector,
            tree: tree.clone(),
            compression: *compression,
        });
        next_sector += payload.sector_count();
    }
    write_region(&path, &seeded);
    path
}
