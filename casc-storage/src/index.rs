//! Local index (.idx) file reader.
//!
//! Each storage keeps up to 16 bucketed index files mapping a 9-byte encoded
//! key prefix to a position inside the data archives. The reader folds all
//! buckets into one view sorted by prefix; lookups are a binary search.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::error::{CascError, Result};
use crate::types::{ArchiveLocation, EKEY_PREFIX_LENGTH, INDEX_FILE_COUNT};

/// One record of the merged view.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    pub prefix: [u8; EKEY_PREFIX_LENGTH],
    pub location: ArchiveLocation,
}

/// Header of an .idx file. Field sizes are declared in the file; the
/// standard layout is 9-byte keys, 5-byte locations and 4-byte sizes with a
/// 30-bit offset split.
#[derive(Debug)]
struct IdxHeader {
    bucket: u8,
    length_field_size: u8,
    location_field_size: u8,
    key_field_size: u8,
    offset_bits: u8,
}

/// All local index files folded into one sorted table.
#[derive(Default)]
pub struct IndexView {
    entries: Vec<IndexEntry>,
}

impl IndexView {
    /// Load every .idx file under the data directory. Files that fail to
    /// parse are skipped; the storage can still resolve online.
    pub fn load_directory(data_dir: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        let mut loaded = 0usize;

        let mut paths: Vec<_> = std::fs::read_dir(data_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("idx"))
            .collect();
        // Name order makes the newest version of each bucket win the dedup.
        paths.sort();

        for path in paths {
            if loaded >= INDEX_FILE_COUNT {
                break;
            }
            match parse_idx_file(&path, &mut entries) {
                Ok(bucket) => {
                    debug!("Loaded index {:?} (bucket {bucket:02x})", path.file_name());
                    loaded += 1;
                }
                Err(e) => warn!("Skipping index {path:?}: {e}"),
            }
        }

        entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        entries.dedup_by(|a, b| a.prefix == b.prefix);

        debug!("Merged {} index entries from {loaded} files", entries.len());
        Ok(IndexView { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binary search by the 9-byte encoded-key prefix.
    pub fn lookup(&self, prefix: &[u8; EKEY_PREFIX_LENGTH]) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.prefix.cmp(prefix))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Copy the archive position onto a catalog entry whose encoded digest
    /// hits the index.
    pub fn apply_to(&self, entry: &mut CatalogEntry) -> bool {
        let Some(hit) = self.lookup(&entry.ekey.prefix()) else {
            return false;
        };
        entry.storage_offset = Some(hit.location);
        if entry.encoded_size.is_none() {
            entry.encoded_size = Some(hit.location.encoded_size);
        }
        entry.span_count = 1;
        true
    }
}

/// Parse one .idx file, appending its records to `out`. Returns the bucket.
fn parse_idx_file(path: &Path, out: &mut Vec<IndexEntry>) -> Result<u8> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    // Header block, little-endian sizes with a content hash we don't verify.
    let header_size = reader.read_u32::<LittleEndian>()?;
    let _header_hash = reader.read_u32::<LittleEndian>()?;
    let _version = reader.read_u16::<LittleEndian>()?;
    let bucket = reader.read_u8()?;
    let _unused = reader.read_u8()?;
    let header = IdxHeader {
        bucket,
        length_field_size: reader.read_u8()?,
        location_field_size: reader.read_u8()?,
        key_field_size: reader.read_u8()?,
        offset_bits: reader.read_u8()?,
    };

    if header.key_field_size as usize != EKEY_PREFIX_LENGTH
        || header.location_field_size != 5
        || header.length_field_size != 4
        || header.offset_bits as u32 >= 40
    {
        return Err(CascError::BadFormat);
    }

    // Skip the remainder of the header block, then align to 16 bytes.
    let block_rest = header_size.saturating_sub(8);
    reader.seek(SeekFrom::Current(i64::from(block_rest)))?;
    let pos = reader.stream_position()?;
    let padding = (16 - pos % 16) % 16;
    reader.seek(SeekFrom::Current(padding as i64))?;

    // Entry section, little-endian size header.
    let entries_size = reader.read_u32::<LittleEndian>()?;
    let _entries_hash = reader.read_u32::<LittleEndian>()?;

    let entry_size = (header.key_field_size
        + header.location_field_size
        + header.length_field_size) as u32;
    let entry_count = entries_size / entry_size;

    out.reserve(entry_count as usize);
    for _ in 0..entry_count {
        out.push(parse_entry(&mut reader, &header)?);
    }

    Ok(header.bucket)
}

fn parse_entry<R: Read>(reader: &mut R, header: &IdxHeader) -> Result<IndexEntry> {
    let mut prefix = [0u8; EKEY_PREFIX_LENGTH];
    reader.read_exact(&mut prefix)?;

    // Combined archive index and offset, big-endian, split at offset_bits.
    let mut combined_bytes = [0u8; 8];
    reader.read_exact(&mut combined_bytes[3..])?;
    let combined = u64::from_be_bytes(combined_bytes);

    let archive_index = (combined >> header.offset_bits) as u16;
    let offset = combined & ((1 << header.offset_bits) - 1);

    let encoded_size = reader.read_u32::<LittleEndian>()?;

    Ok(IndexEntry {
        prefix,
        location: ArchiveLocation {
            archive_index,
            offset,
            encoded_size,
        },
    })
}

/// Serialize entries into a minimal standard-layout .idx file. Test fixture
/// support; the engine never writes storage.
#[cfg(test)]
pub(crate) fn write_idx_file(path: &Path, bucket: u8, entries: &[IndexEntry]) -> Result<()> {
    let mut data = Vec::new();

    // Header block: size 16, unverified hash, version 7, bucket, field sizes.
    data.extend_from_slice(&16u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&7u16.to_le_bytes());
    data.push(bucket);
    data.push(0);
    data.push(4); // length field
    data.push(5); // location field
    data.push(9); // key field
    data.push(30); // offset bits
    data.extend_from_slice(&[0; 8]); // rest of the declared header block
    while data.len() % 16 != 0 {
        data.push(0);
    }

    data.extend_from_slice(&(entries.len() as u32 * 18).to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    for e in entries {
        data.extend_from_slice(&e.prefix);
        let combined =
            (u64::from(e.location.archive_index) << 30) | (e.location.offset & 0x3FFF_FFFF);
        data.extend_from_slice(&combined.to_be_bytes()[3..]);
        data.extend_from_slice(&e.location.encoded_size.to_le_bytes());
    }

    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(prefix_byte: u8, archive: u16, offset: u64, size: u32) -> IndexEntry {
        IndexEntry {
            prefix: [prefix_byte; 9],
            location: ArchiveLocation {
                archive_index: archive,
                offset,
                encoded_size: size,
            },
        }
    }

    #[test]
    fn test_round_trip_through_idx_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0000000010.idx");
        write_idx_file(
            &path,
            0,
            &[
                entry(0x30, 2, 0x1234, 500),
                entry(0x10, 1023, 0x3FFF_FFFF, 77),
            ],
        )
        .unwrap();

        let view = IndexView::load_directory(dir.path()).unwrap();
        assert_eq!(view.len(), 2);

        let hit = view.lookup(&[0x10; 9]).unwrap();
        assert_eq!(hit.location.archive_index, 1023);
        assert_eq!(hit.location.offset, 0x3FFF_FFFF);
        assert_eq!(hit.location.encoded_size, 77);

        let hit = view.lookup(&[0x30; 9]).unwrap();
        assert_eq!(hit.location.archive_index, 2);
        assert_eq!(hit.location.offset, 0x1234);

        assert!(view.lookup(&[0x99; 9]).is_none());
    }

    #[test]
    fn test_merged_view_is_sorted_and_deduped() {
        let dir = TempDir::new().unwrap();
        write_idx_file(
            &dir.path().join("0000000010.idx"),
            0,
            &[entry(0x20, 1, 10, 1)],
        )
        .unwrap();
        write_idx_file(
            &dir.path().join("0100000010.idx"),
            1,
            &[entry(0x10, 2, 20, 2), entry(0x20, 3, 30, 3)],
        )
        .unwrap();

        let view = IndexView::load_directory(dir.path()).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.lookup(&[0x10; 9]).unwrap().location.archive_index, 2);
        // First file in name order wins for a duplicate prefix.
        assert_eq!(view.lookup(&[0x20; 9]).unwrap().location.archive_index, 1);
    }

    #[test]
    fn test_unparseable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bogus.idx"), b"not an index").unwrap();
        write_idx_file(&dir.path().join("0000000010.idx"), 0, &[entry(0x40, 0, 0, 9)])
            .unwrap();

        let view = IndexView::load_directory(dir.path()).unwrap();
        assert_eq!(view.len(), 1);
    }
}
