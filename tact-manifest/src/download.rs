//! DOWNLOAD manifest parser.
//!
//! The download manifest lists encoded blobs with their size and priority,
//! and partitions them into named tag groups (platform, locale, content
//! class) through per-tag bitmaps over the entry indices.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::{debug, trace};

use crate::ioutils::ReadInt;
use crate::{Error, Md5, Result, MD5_LENGTH};

/// Download manifest header
#[derive(Debug, Clone)]
pub struct DownloadHeader {
    /// Version (1, 2, or 3)
    pub version: u8,
    /// EKey size on the wire (at most 16)
    pub ekey_length: u8,
    /// Whether entries include checksums
    pub has_checksum: bool,
    /// Number of file entries
    pub entry_count: u32,
    /// Number of tags
    pub tag_count: u16,
    /// Size of flag data per entry (v2+)
    pub flag_size: u8,
    /// Base priority offset (v3+)
    pub base_priority: i8,
}

impl DownloadHeader {
    /// Parse download manifest header
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;
        if magic != [b'D', b'L'] {
            return Err(Error::BadMagic);
        }

        let version = reader.read_u8()?;
        if !(1..=3).contains(&version) {
            return Err(Error::BadFormat);
        }

        let ekey_length = reader.read_u8()?;
        if ekey_length as usize > MD5_LENGTH {
            return Err(Error::BadFormat);
        }

        let has_checksum = reader.read_u8()? != 0;
        let entry_count = reader.read_u32::<BigEndian>()?;
        let tag_count = reader.read_u16::<BigEndian>()?;

        let mut flag_size = 0;
        let mut base_priority = 0i8;

        if version >= 2 {
            flag_size = reader.read_u8()?;

            if version >= 3 {
                base_priority = reader.read_i8()?;
                // Reserved 24-bit field
                let mut reserved = [0u8; 3];
                reader.read_exact(&mut reserved)?;
            }
        }

        Ok(DownloadHeader {
            version,
            ekey_length,
            has_checksum,
            entry_count,
            tag_count,
            flag_size,
            base_priority,
        })
    }
}

/// Download manifest file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    /// Encoding key, zero-padded to 16 bytes; the first 9 are authoritative.
    pub ekey: Md5,
    /// Size of the encoded blob
    pub encoded_size: u64,
    /// Download priority, already adjusted by the base priority
    pub priority: i8,
    /// Optional checksum
    pub checksum: Option<u32>,
    /// Flag bytes as a big-endian integer (v2+)
    pub flags: u64,
}

impl DownloadEntry {
    fn parse<R: Read>(reader: &mut R, header: &DownloadHeader) -> Result<Self> {
        let mut ekey = [0u8; MD5_LENGTH];
        reader.read_exact(&mut ekey[..header.ekey_length as usize])?;

        let encoded_size = reader.read_u40be()?;
        let priority = reader.read_i8()?.wrapping_sub(header.base_priority);

        let checksum = if header.has_checksum {
            Some(reader.read_u32::<BigEndian>()?)
        } else {
            None
        };

        let flags = reader.read_uint_be(header.flag_size as usize)?;

        Ok(DownloadEntry {
            ekey,
            encoded_size,
            priority,
            checksum,
            flags,
        })
    }
}

/// Download manifest tag
#[derive(Debug, Clone)]
pub struct DownloadTag {
    /// Tag name
    pub name: String,
    /// Tag value (1 = locale, 2 = platform, ...)
    pub value: u16,
    /// Bitmask over entry indices. May be shorter than declared when the
    /// manifest truncates the final tag.
    pub mask: Vec<u8>,
}

impl DownloadTag {
    /// Whether entry `i` carries this tag. Bits beyond the stored mask
    /// length read as zero.
    pub fn is_set(&self, i: usize) -> bool {
        self.mask
            .get(i / 8)
            .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0)
    }
}

/// Download manifest file
#[derive(Debug, Clone)]
pub struct DownloadManifest {
    /// Header information
    pub header: DownloadHeader,
    /// File entries in manifest order; the index is what tag bitmaps refer to
    pub entries: Vec<DownloadEntry>,
    /// Tags for conditional downloads
    pub tags: Vec<DownloadTag>,
    /// Longest tag name, for sizing the persistent tag table
    pub max_tag_name_len: usize,
}

impl DownloadManifest {
    /// Parse a download manifest from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let header = DownloadHeader::parse(&mut cursor)?;
        debug!(
            "Parsing download manifest v{} with {} entries and {} tags",
            header.version, header.entry_count, header.tag_count
        );

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for i in 0..header.entry_count {
            let entry = DownloadEntry::parse(&mut cursor, &header)?;
            trace!(
                "Entry {i}: EKey {:02x?} priority={} size={}",
                &entry.ekey[..4],
                entry.priority,
                entry.encoded_size
            );
            entries.push(entry);
        }

        let bytes_per_tag = header.entry_count.div_ceil(8) as usize;
        let mut tags = Vec::with_capacity(header.tag_count as usize);
        let mut max_tag_name_len = 0;

        for i in 0..header.tag_count {
            let name = cursor.read_cstring()?;
            let value = cursor.read_u16::<BigEndian>()?;

            // The final tag's bitmap may be cut short; absent bits are zero.
            let remaining = data.len().saturating_sub(cursor.position() as usize);
            let mut mask = vec![0u8; bytes_per_tag.min(remaining)];
            cursor.read_exact(&mut mask)?;

            trace!("Tag {i}: {name:?} value={value} mask_len={}", mask.len());
            max_tag_name_len = max_tag_name_len.max(name.len());
            tags.push(DownloadTag { name, value, mask });
        }

        Ok(DownloadManifest {
            header,
            entries,
            tags,
            max_tag_name_len,
        })
    }
}
