//! Region files: sector-addressed containers of compressed chunk data.
//!
//! A region file is an array of 4096-byte sectors. Sector 0 is the location
//! table (1024 big-endian entries, one per chunk slot), sector 1 holds
//! timestamps and is treated as opaque. A chunk payload is a 4-byte length,
//! a 1-byte compression discriminant, and the compressed tag tree, padded
//! with zeros to the next sector boundary.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};
use flate2::read::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use mcstrings_nbt::reader::ReadAdaptor;
use mcstrings_nbt::Nbt;
use thiserror::Error;

/// The number of bytes in a sector (4 KiB).
pub const SECTOR_BYTES: usize = 4096;

/// The number of chunk slots in a region (32x32).
pub const CHUNK_COUNT: usize = 1024;

/// The sector count of a location entry is a single byte.
pub const MAX_CHUNK_SECTORS: u64 = 255;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("invalid compression type: {0}")]
    UnknownCompression(u8),
    #[error("error while working with zlib compression: {0}")]
    ZlibError(std::io::Error),
    #[error("error while working with gzip compression: {0}")]
    GZipError(std::io::Error),
}

#[derive(Error, Debug)]
pub enum ChunkReadingError {
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("invalid region header")]
    InvalidHeader,
    #[error("invalid chunk length: {0}")]
    InvalidLength(u32),
    #[error("chunk payload is cut short ({declared} bytes declared, {available} available)")]
    TruncatedPayload { declared: usize, available: usize },
    #[error("compression error: {0}")]
    Compression(CompressionError),
    #[error("tried to read chunk which does not exist")]
    ChunkNotExist,
    #[error("cannot decode chunk NBT data: {0}")]
    Nbt(mcstrings_nbt::Error),
}

#[derive(Error, Debug)]
pub enum ChunkWritingError {
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("compression error: {0}")]
    Compression(CompressionError),
    #[error("cannot encode chunk NBT data: {0}")]
    Nbt(mcstrings_nbt::Error),
    #[error("new chunk data is too large ({0} sectors)")]
    ChunkTooLarge(u64),
    #[error("region file is invalid: not a multiple of 4kB")]
    UnalignedRegion,
}

/// Compression applied to a chunk payload. `None` in the surrounding code
/// means the payload is stored uncompressed (discriminant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    GZip = Self::GZIP_ID,
    ZLib = Self::ZLIB_ID,
}

impl Compression {
    const GZIP_ID: u8 = 1;
    const ZLIB_ID: u8 = 2;
    const NO_COMPRESSION_ID: u8 = 3;

    pub fn from_byte(byte: u8) -> Result<Option<Self>, CompressionError> {
        match byte {
            Self::GZIP_ID => Ok(Some(Self::GZip)),
            Self::ZLIB_ID => Ok(Some(Self::ZLib)),
            Self::NO_COMPRESSION_ID => Ok(None),
            other => Err(CompressionError::UnknownCompression(other)),
        }
    }

    pub fn to_byte(compression: Option<Compression>) -> u8 {
        compression.map_or(Self::NO_COMPRESSION_ID, |c| c as u8)
    }

    fn decompress_data(&self, compressed_data: &[u8]) -> Result<Box<[u8]>, CompressionError> {
        match self {
            Compression::GZip => {
                let mut decoder = GzDecoder::new(compressed_data);
                let mut chunk_data = Vec::new();
                decoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::GZipError)?;
                Ok(chunk_data.into_boxed_slice())
            }
            Compression::ZLib => {
                let mut decoder = ZlibDecoder::new(compressed_data);
                let mut chunk_data = Vec::new();
                decoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(chunk_data.into_boxed_slice())
            }
        }
    }

    fn compress_data(&self, uncompressed_data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::GZip => {
                let mut encoder =
                    GzEncoder::new(uncompressed_data, flate2::Compression::default());
                let mut chunk_data = Vec::new();
                encoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::GZipError)?;
                Ok(chunk_data)
            }
            Compression::ZLib => {
                let mut encoder =
                    ZlibEncoder::new(uncompressed_data, flate2::Compression::default());
                let mut chunk_data = Vec::new();
                encoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(chunk_data)
            }
        }
    }
}

/// One entry of the location table: a 24-bit starting sector and an 8-bit
/// sector count. A zero entry marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkLocation(u32);

impl ChunkLocation {
    pub const EMPTY: ChunkLocation = ChunkLocation(0);

    pub fn new(start_sector: u64, sector_count: u64) -> Self {
        Self(((start_sector as u32) << 8) | sector_count as u32)
    }

    pub fn from_entry(entry: u32) -> Self {
        Self(entry)
    }

    pub fn entry(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn start_sector(self) -> u64 {
        (self.0 >> 8) as u64
    }

    pub fn sector_count(self) -> u64 {
        (self.0 & 0xFF) as u64
    }

    pub fn byte_offset(self) -> u64 {
        self.start_sector() * SECTOR_BYTES as u64
    }

    pub fn byte_len(self) -> u64 {
        self.sector_count() * SECTOR_BYTES as u64
    }
}

/// A chunk body as stored on disk: the compression discriminant and the
/// compressed bytes, without the length prefix or the sector padding.
#[derive(Clone, Debug)]
pub struct ChunkPayload {
    compression: Option<Compression>,
    compressed_data: Bytes,
}

impl ChunkPayload {
    /// Size of the stored form without padding: length prefix, discriminant,
    /// and the compressed bytes.
    #[inline]
    fn raw_write_size(&self) -> usize {
        self.compressed_data.len() + 4 + 1
    }

    /// Size of the stored form including the zero padding.
    #[inline]
    fn padded_size(&self) -> usize {
        self.sector_count() as usize * SECTOR_BYTES
    }

    #[inline]
    pub fn sector_count(&self) -> u64 {
        self.raw_write_size().div_ceil(SECTOR_BYTES) as u64
    }

    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Parses a stored chunk from its sector-aligned bytes, trimming padding.
    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, ChunkReadingError> {
        if bytes.len() < 5 {
            return Err(ChunkReadingError::TruncatedPayload {
                declared: 5,
                available: bytes.len(),
            });
        }

        // The length covers the discriminant byte and the compressed bytes,
        // but not the length field itself.
        let length = bytes.get_u32();
        if length == 0 {
            return Err(ChunkReadingError::InvalidLength(length));
        }

        let compression_byte = bytes.get_u8();
        let compression =
            Compression::from_byte(compression_byte).map_err(ChunkReadingError::Compression)?;

        let data_len = length as usize - 1;
        if data_len > bytes.len() {
            return Err(ChunkReadingError::TruncatedPayload {
                declared: data_len,
                available: bytes.len(),
            });
        }

        Ok(ChunkPayload {
            compression,
            compressed_data: bytes.slice(..data_len),
        })
    }

    /// Decompresses and decodes the payload into its tag tree.
    pub fn decode(&self) -> Result<Nbt, ChunkReadingError> {
        let tree = if let Some(compression) = self.compression {
            let decompressed = compression
                .decompress_data(&self.compressed_data)
                .map_err(ChunkReadingError::Compression)?;
            Nbt::read(&mut ReadAdaptor::new(&decompressed[..]))
        } else {
            Nbt::read(&mut ReadAdaptor::new(&self.compressed_data[..]))
        }
        .map_err(ChunkReadingError::Nbt)?;

        Ok(tree)
    }

    /// Encodes a tag tree with the given compression. Pass the compression
    /// the chunk was read with so a round trip does not change it.
    pub fn from_tree(
        tree: &Nbt,
        compression: Option<Compression>,
    ) -> Result<Self, ChunkWritingError> {
        let raw_bytes = tree.write().map_err(ChunkWritingError::Nbt)?;

        let compressed_data = match compression {
            Some(compression) => compression
                .compress_data(&raw_bytes)
                .map_err(ChunkWritingError::Compression)?
                .into(),
            None => raw_bytes,
        };

        Ok(ChunkPayload {
            compression,
            compressed_data,
        })
    }

    /// Writes the stored form: length, discriminant, compressed bytes, and
    /// zero padding up to the next sector boundary.
    pub fn write_to(&self, w: &mut impl Write) -> std::io::Result<()> {
        w.write_all(&((self.compressed_data.len() + 1) as u32).to_be_bytes())?;
        w.write_all(&[Compression::to_byte(self.compression)])?;
        w.write_all(&self.compressed_data)?;
        w.write_all(&vec![0u8; self.padded_size() - self.raw_write_size()])?;
        Ok(())
    }
}

/// An open region file with its location table resident in memory.
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    locations: Box<[ChunkLocation; CHUNK_COUNT]>,
}

impl RegionFile {
    /// Opens a region file for reading.
    pub fn open(path: &Path) -> Result<Self, ChunkReadingError> {
        Self::open_with(path, OpenOptions::new().read(true))
    }

    /// Opens a region file for reading and in-place writing.
    pub fn open_rw(path: &Path) -> Result<Self, ChunkReadingError> {
        Self::open_with(path, OpenOptions::new().read(true).write(true))
    }

    fn open_with(path: &Path, options: &OpenOptions) -> Result<Self, ChunkReadingError> {
        let mut file = options.open(path).map_err(ChunkReadingError::Io)?;

        // The location table and the timestamp table must both be present.
        let len = file.metadata().map_err(ChunkReadingError::Io)?.len();
        if len < (SECTOR_BYTES * 2) as u64 {
            return Err(ChunkReadingError::InvalidHeader);
        }

        let mut table = [0u8; SECTOR_BYTES];
        file.read_exact(&mut table).map_err(ChunkReadingError::Io)?;

        let mut locations = Box::new([ChunkLocation::EMPTY; CHUNK_COUNT]);
        for (index, entry) in table.chunks_exact(4).enumerate() {
            locations[index] =
                ChunkLocation::from_entry(u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]));
        }

        Ok(RegionFile {
            path: path.to_path_buf(),
            file,
            locations,
        })
    }

    pub fn location(&self, index: usize) -> ChunkLocation {
        self.locations[index]
    }

    /// Reads and decodes the chunk in the given slot. Returns `None` when the
    /// slot is empty.
    #[allow(clippy::type_complexity)]
    pub fn read_chunk(
        &mut self,
        index: usize,
    ) -> Result<Option<(Option<Compression>, Nbt)>, ChunkReadingError> {
        let location = self.locations[index];
        if location.is_empty() {
            return Ok(None);
        }

        self.file
            .seek(SeekFrom::Start(location.byte_offset()))
            .map_err(ChunkReadingError::Io)?;

        // Cap the read at the allocation so a bad length field cannot pull
        // in bytes owned by other chunks.
        let mut bytes = Vec::with_capacity(location.byte_len() as usize);
        (&mut self.file)
            .take(location.byte_len())
            .read_to_end(&mut bytes)
            .map_err(ChunkReadingError::Io)?;

        let payload = ChunkPayload::from_bytes(bytes.into())?;
        let tree = payload.decode()?;
        Ok(Some((payload.compression(), tree)))
    }

    /// Writes a chunk payload into the given slot, in place when it fits.
    ///
    /// A payload needing more sectors than the current allocation is written
    /// at the end of the file instead, unless the allocation is already the
    /// last one in the file, in which case it grows where it is. Returns
    /// whether the slot was resized or relocated; if so, the file now has
    /// orphaned sectors (or trailing growth) and compaction is worthwhile.
    pub fn write_chunk(
        &mut self,
        index: usize,
        payload: &ChunkPayload,
    ) -> Result<bool, ChunkWritingError> {
        let new_sectors = payload.sector_count();
        if new_sectors > MAX_CHUNK_SECTORS {
            return Err(ChunkWritingError::ChunkTooLarge(new_sectors));
        }

        let location = self.locations[index];
        let mut start_sector = location.start_sector();

        if new_sectors > location.sector_count() {
            let end = self
                .file
                .seek(SeekFrom::End(0))
                .map_err(ChunkWritingError::Io)?;
            if end % SECTOR_BYTES as u64 != 0 {
                return Err(ChunkWritingError::UnalignedRegion);
            }
            // Growing in place would overwrite the next chunk's sectors, so
            // move to the end of the file -- unless this allocation already
            // is the end of the file.
            if location.byte_offset() + location.byte_len() < end {
                log::debug!(
                    "relocating chunk slot {} in {:?} from sector {} to end of file at sector {}",
                    index,
                    self.path,
                    start_sector,
                    end / SECTOR_BYTES as u64
                );
                start_sector = end / SECTOR_BYTES as u64;
            }
        }

        let new_location = ChunkLocation::new(start_sector, new_sectors);
        let resized = new_location != location;
        if resized {
            log::debug!(
                "resizing chunk slot {} in {:?} from {} to {} sectors",
                index,
                self.path,
                location.sector_count(),
                new_sectors
            );
            self.file
                .seek(SeekFrom::Start((4 * index) as u64))
                .map_err(ChunkWritingError::Io)?;
            self.file
                .write_all(&new_location.entry().to_be_bytes())
                .map_err(ChunkWritingError::Io)?;
            self.locations[index] = new_location;
        }

        self.file
            .seek(SeekFrom::Start(new_location.byte_offset()))
            .map_err(ChunkWritingError::Io)?;
        payload.write_to(&mut self.file).map_err(ChunkWritingError::Io)?;

        Ok(resized)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{text_chunk, write_region, SeededChunk};
    use bytes::Bytes;
    use tempfile::TempDir;

    #[test]
    fn payload_round_trips_each_compression() {
        let tree = text_chunk("round trip");
        for compression in [Some(Compression::GZip), Some(Compression::ZLib), None] {
            let payload = ChunkPayload::from_tree(&tree, compression).unwrap();
            assert_eq!(payload.compression(), compression);

            let mut stored = Vec::new();
            payload.write_to(&mut stored).unwrap();
            assert_eq!(stored.len() % SECTOR_BYTES, 0);

            let parsed = ChunkPayload::from_bytes(Bytes::from(stored)).unwrap();
            assert_eq!(parsed.compression(), compression);
            assert_eq!(parsed.decode().unwrap(), tree);
        }
    }

    #[test]
    fn unknown_compression_discriminant_is_rejected() {
        let bytes = Bytes::from_static(&[0, 0, 0, 2, 9, 0xAB]);
        let err = ChunkPayload::from_bytes(bytes).unwrap_err();
        assert!(matches!(
            err,
            ChunkReadingError::Compression(CompressionError::UnknownCompression(9))
        ));
    }

    #[test]
    fn zero_length_is_rejected() {
        let bytes = Bytes::from_static(&[0, 0, 0, 0, 2, 0]);
        assert!(matches!(
            ChunkPayload::from_bytes(bytes).unwrap_err(),
            ChunkReadingError::InvalidLength(0)
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        // Declares 100 bytes of data but provides 1.
        let bytes = Bytes::from_static(&[0, 0, 0, 101, 2, 0xFF]);
        assert!(matches!(
            ChunkPayload::from_bytes(bytes).unwrap_err(),
            ChunkReadingError::TruncatedPayload { declared: 100, available: 1 }
        ));
    }

    #[test]
    fn empty_slot_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[SeededChunk {
                slot: 0,
                start_sector: 2,
                tree: text_chunk("only slot zero"),
                compression: Some(Compression::ZLib),
            }],
        );

        let mut region = RegionFile::open(&path).unwrap();
        assert!(region.read_chunk(0).unwrap().is_some());
        assert!(region.read_chunk(1).unwrap().is_none());
    }

    #[test]
    fn short_file_has_invalid_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        std::fs::write(&path, vec![0u8; SECTOR_BYTES]).unwrap();
        assert!(matches!(
            RegionFile::open(&path).unwrap_err(),
            ChunkReadingError::InvalidHeader
        ));
    }

    #[test]
    fn rewrite_in_place_keeps_the_allocation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[SeededChunk {
                slot: 7,
                start_sector: 2,
                tree: text_chunk("before"),
                compression: Some(Compression::ZLib),
            }],
        );
        let len_before = std::fs::metadata(&path).unwrap().len();

        let mut region = RegionFile::open_rw(&path).unwrap();
        let payload =
            ChunkPayload::from_tree(&text_chunk("after"), Some(Compression::ZLib)).unwrap();
        let resized = region.write_chunk(7, &payload).unwrap();
        assert!(!resized);
        assert_eq!(region.location(7), ChunkLocation::new(2, 1));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);

        let mut region = RegionFile::open(&path).unwrap();
        let (compression, tree) = region.read_chunk(7).unwrap().unwrap();
        assert_eq!(compression, Some(Compression::ZLib));
        assert_eq!(tree, text_chunk("after"));
    }

    #[test]
    fn growth_relocates_to_end_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        // Two chunks, so slot 0 is not last and cannot grow in place.
        write_region(
            &path,
            &[
                SeededChunk {
                    slot: 0,
                    start_sector: 2,
                    tree: text_chunk("small"),
                    compression: None,
                },
                SeededChunk {
                    slot: 1,
                    start_sector: 3,
                    tree: text_chunk("neighbor"),
                    compression: None,
                },
            ],
        );

        let mut region = RegionFile::open_rw(&path).unwrap();
        // Uncompressed payload of more than one sector.
        let payload =
            ChunkPayload::from_tree(&text_chunk(&"a".repeat(2 * SECTOR_BYTES)), None).unwrap();
        assert!(payload.sector_count() > 1);

        let resized = region.write_chunk(0, &payload).unwrap();
        assert!(resized);
        assert_eq!(region.location(0).start_sector(), 4);
        assert_eq!(region.location(0).sector_count(), payload.sector_count());

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (4 + payload.sector_count()) * SECTOR_BYTES as u64);
        assert_eq!(len % SECTOR_BYTES as u64, 0);

        // Both chunks still decode; the neighbor is untouched.
        let mut region = RegionFile::open(&path).unwrap();
        assert_eq!(
            region.read_chunk(0).unwrap().unwrap().1,
            text_chunk(&"a".repeat(2 * SECTOR_BYTES))
        );
        assert_eq!(region.read_chunk(1).unwrap().unwrap().1, text_chunk("neighbor"));
    }

    #[test]
    fn last_chunk_grows_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[SeededChunk {
                slot: 0,
                start_sector: 2,
                tree: text_chunk("small"),
                compression: None,
            }],
        );

        let mut region = RegionFile::open_rw(&path).unwrap();
        let payload =
            ChunkPayload::from_tree(&text_chunk(&"b".repeat(SECTOR_BYTES)), None).unwrap();
        assert_eq!(payload.sector_count(), 2);

        let resized = region.write_chunk(0, &payload).unwrap();
        assert!(resized);
        // Already the last allocation: the start is reused and the file
        // simply extends.
        assert_eq!(region.location(0), ChunkLocation::new(2, 2));
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            4 * SECTOR_BYTES as u64
        );
    }

    #[test]
    fn shrink_updates_the_entry_and_leaves_orphans() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[SeededChunk {
                slot: 0,
                start_sector: 2,
                tree: text_chunk(&"c".repeat(SECTOR_BYTES)),
                compression: None,
            }],
        );
        let len_before = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len_before, 4 * SECTOR_BYTES as u64);

        let mut region = RegionFile::open_rw(&path).unwrap();
        let payload = ChunkPayload::from_tree(&text_chunk("tiny"), None).unwrap();
        let resized = region.write_chunk(0, &payload).unwrap();
        assert!(resized);
        assert_eq!(region.location(0), ChunkLocation::new(2, 1));
        // The trailing sector is orphaned, not reclaimed.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[SeededChunk {
                slot: 0,
                start_sector: 2,
                tree: text_chunk("small"),
                compression: None,
            }],
        );

        let mut region = RegionFile::open_rw(&path).unwrap();
        // An uncompressed tree of ~1 MiB needs more than 255 sectors. A
        // single string tag caps at 64 KiB, so pile up a list of them.
        let mut root = mcstrings_nbt::compound::NbtCompound::new();
        let page = mcstrings_nbt::tag::NbtTag::String("d".repeat(60_000));
        root.put(
            "pages",
            mcstrings_nbt::tag::NbtTag::List(vec![page; 18].into_boxed_slice()),
        );
        let payload = ChunkPayload::from_tree(&mcstrings_nbt::Nbt::from(root), None).unwrap();
        assert!(payload.sector_count() > MAX_CHUNK_SECTORS);
        assert!(matches!(
            region.write_chunk(0, &payload).unwrap_err(),
            ChunkWritingError::ChunkTooLarge(_)
        ));
    }
}
