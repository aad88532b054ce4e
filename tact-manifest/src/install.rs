//! INSTALL manifest parser.
//!
//! The install manifest names the files an installation materializes on
//! disk, keyed by content digest. The storage layer falls back to it when no
//! ROOT manifest can be decoded, so that name lookups still work.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tracing::{debug, trace};

use crate::ioutils::ReadInt;
use crate::{Error, Result};

/// Magic bytes for install manifest: "IN"
const INSTALL_MAGIC: [u8; 2] = [0x49, 0x4E]; // 'I', 'N'

/// Install manifest header
#[derive(Debug, Clone)]
pub struct InstallHeader {
    /// Version (should be 1)
    pub version: u8,
    /// Hash size (usually 16 for MD5)
    pub hash_size: u8,
    /// Number of tags
    pub tag_count: u16,
    /// Number of file entries
    pub entry_count: u32,
}

/// Install tag information
#[derive(Debug, Clone)]
pub struct InstallTag {
    /// Tag name (e.g., "Windows", "OSX", "enUS")
    pub name: String,
    /// Tag value
    pub value: u16,
    /// Bitmask over entry indices
    pub mask: Vec<u8>,
}

impl InstallTag {
    /// Whether entry `i` carries this tag.
    pub fn is_set(&self, i: usize) -> bool {
        self.mask
            .get(i / 8)
            .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0)
    }
}

/// Install file entry
#[derive(Debug, Clone)]
pub struct InstallEntry {
    /// File path relative to the installation root
    pub path: String,
    /// Content key
    pub ckey: Vec<u8>,
    /// Decoded file size
    pub size: u32,
}

/// Install manifest
pub struct InstallManifest {
    /// File header
    pub header: InstallHeader,
    /// List of tags
    pub tags: Vec<InstallTag>,
    /// List of file entries
    pub entries: Vec<InstallEntry>,
}

impl InstallManifest {
    /// Parse an install manifest from raw data
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let header = Self::parse_header(&mut cursor)?;
        debug!(
            "Parsed install header: version={}, tags={}, entries={}",
            header.version, header.tag_count, header.entry_count
        );

        let bytes_per_tag = header.entry_count.div_ceil(8) as usize;

        let mut tags = Vec::with_capacity(header.tag_count as usize);
        for i in 0..header.tag_count {
            let name = cursor.read_cstring()?;
            let value = cursor.read_u16::<BigEndian>()?;

            let mut mask = vec![0u8; bytes_per_tag];
            cursor.read_exact(&mut mask)?;

            trace!("Tag {i}: name={name:?}, value={value:#06x}");
            tags.push(InstallTag { name, value, mask });
        }

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let path = cursor.read_cstring()?;

            let mut ckey = vec![0u8; header.hash_size as usize];
            cursor.read_exact(&mut ckey)?;

            let size = cursor.read_u32::<BigEndian>()?;

            entries.push(InstallEntry { path, ckey, size });
        }

        debug!("Parsed {} install entries", entries.len());

        Ok(InstallManifest {
            header,
            tags,
            entries,
        })
    }

    /// Parse the install manifest header
    fn parse_header<R: Read>(reader: &mut R) -> Result<InstallHeader> {
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;

        if magic != INSTALL_MAGIC {
            return Err(Error::BadMagic);
        }

        let version = reader.read_u8()?;
        let hash_size = reader.read_u8()?;
        let tag_count = reader.read_u16::<BigEndian>()?;
        let entry_count = reader.read_u32::<BigEndian>()?;

        Ok(InstallHeader {
            version,
            hash_size,
            tag_count,
            entry_count,
        })
    }

    /// Tags carried by entry `i`.
    pub fn tags_for_entry(&self, i: usize) -> impl Iterator<Item = &InstallTag> {
        self.tags.iter().filter(move |t| t.is_set(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_install() {
        let mut data = Vec::new();
        data.extend_from_slice(&INSTALL_MAGIC);
        data.push(1); // Version
        data.push(16); // Hash size
        data.extend_from_slice(&0u16.to_be_bytes()); // Tag count
        data.extend_from_slice(&0u32.to_be_bytes()); // Entry count

        let manifest = InstallManifest::parse(&data).unwrap();
        assert_eq!(manifest.header.version, 1);
        assert_eq!(manifest.tags.len(), 0);
        assert_eq!(manifest.entries.len(), 0);
    }

    #[test]
    fn test_invalid_magic() {
        let data = vec![0xFF, 0xFF, 1];
        assert!(matches!(
            InstallManifest::parse(&data),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn test_parse_with_tags() {
        let mut data = Vec::new();
        data.extend_from_slice(&INSTALL_MAGIC);
        data.push(1); // Version
        data.push(16); // Hash size
        data.extend_from_slice(&1u16.to_be_bytes()); // 1 tag
        data.extend_from_slice(&2u32.to_be_bytes()); // 2 entries

        // Tag
        data.extend_from_slice(b"Windows\0");
        data.extend_from_slice(&2u16.to_be_bytes());
        data.push(0b1000_0000); // only the first entry

        // Entry 0
        data.extend_from_slice(b"game.exe\0");
        data.extend_from_slice(&[1u8; 16]);
        data.extend_from_slice(&1024u32.to_be_bytes());

        // Entry 1
        data.extend_from_slice(b"other.bin\0");
        data.extend_from_slice(&[2u8; 16]);
        data.extend_from_slice(&2048u32.to_be_bytes());

        let manifest = InstallManifest::parse(&data).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].path, "game.exe");
        assert_eq!(manifest.entries[0].size, 1024);
        assert_eq!(
            manifest.tags_for_entry(0).map(|t| t.name.as_str()).collect::<Vec<_>>(),
            ["Windows"]
        );
        assert_eq!(manifest.tags_for_entry(1).count(), 0);
    }
}
