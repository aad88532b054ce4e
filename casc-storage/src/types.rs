//! Common types used throughout the CASC storage system

use std::fmt;

/// Number of EKey bytes that are authoritative for lookups.
pub const EKEY_PREFIX_LENGTH: usize = 9;

/// Maximum number of local index files.
pub const INDEX_FILE_COUNT: usize = 16;

/// Separator between the segments of an open-parameter string.
pub const PARAM_SEPARATOR: char = '*';

/// Content key - MD5 of the decoded file bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CKey(pub [u8; 16]);

impl CKey {
    pub const ZERO: CKey = CKey([0; 16]);

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        data.try_into().ok().map(CKey)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for CKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Encoding key - MD5 of the encoded blob. Stored as 16 bytes, compared and
/// indexed by the first [`EKEY_PREFIX_LENGTH`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EKey(pub [u8; 16]);

impl EKey {
    pub const ZERO: EKey = EKey([0; 16]);

    /// Build an EKey from 9..=16 bytes, zero-padding the tail.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if !(EKEY_PREFIX_LENGTH..=16).contains(&data.len()) {
            return None;
        }
        let mut key = [0u8; 16];
        key[..data.len()].copy_from_slice(data);
        Some(EKey(key))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The authoritative lookup prefix.
    pub fn prefix(&self) -> [u8; EKEY_PREFIX_LENGTH] {
        let mut prefix = [0u8; EKEY_PREFIX_LENGTH];
        prefix.copy_from_slice(&self.0[..EKEY_PREFIX_LENGTH]);
        prefix
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for EKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Location of an encoded blob within the local data archives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Archive file number (data.XXX)
    pub archive_index: u16,
    /// Offset within the archive file
    pub offset: u64,
    /// Size of the encoded blob, including header and frame table
    pub encoded_size: u32,
}

/// Storage feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascFeatures(pub u32);

impl CascFeatures {
    /// Local data archives with index files are present.
    pub const DATA_ARCHIVES: CascFeatures = CascFeatures(0x0000_0001);
    /// Loose data files are present.
    pub const DATA_FILES: CascFeatures = CascFeatures(0x0000_0002);
    /// Missing content may be fetched from the CDN.
    pub const ONLINE: CascFeatures = CascFeatures(0x0000_0004);
    /// The DOWNLOAD manifest declared tags.
    pub const TAGS: CascFeatures = CascFeatures(0x0000_0008);
    /// The caller asked for everything to be (re-)fetched.
    pub const FORCE_DOWNLOAD: CascFeatures = CascFeatures(0x0000_0010);

    pub fn contains(&self, other: CascFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CascFeatures) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CascFeatures) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for CascFeatures {
    type Output = CascFeatures;
    fn bitor(self, rhs: CascFeatures) -> CascFeatures {
        CascFeatures(self.0 | rhs.0)
    }
}

/// Per-entry flags recording which manifests know about the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(pub u16);

impl EntryFlags {
    /// The content digest is known.
    pub const HAS_CKEY: EntryFlags = EntryFlags(0x0001);
    /// The encoded digest is known.
    pub const HAS_EKEY: EntryFlags = EntryFlags(0x0002);
    /// Only the 9-byte prefix of the encoded digest is known.
    pub const HAS_EKEY_PARTIAL: EntryFlags = EntryFlags(0x0004);
    /// Listed in the ENCODING manifest.
    pub const IN_ENCODING: EntryFlags = EntryFlags(0x0008);
    /// Listed in the DOWNLOAD manifest.
    pub const IN_DOWNLOAD: EntryFlags = EntryFlags(0x0010);
    /// Named by the CDN build document (well-known file).
    pub const IN_BUILD: EntryFlags = EntryFlags(0x0020);
    /// The PATCH file; only ever available online.
    pub const FILE_PATCH: EntryFlags = EntryFlags(0x0040);

    pub fn contains(&self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: EntryFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EntryFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for EntryFlags {
    type Output = EntryFlags;
    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

/// A tag declared by the DOWNLOAD manifest, in declaration order. The
/// position in the storage's tag table is the bit position in every entry's
/// tag bitmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub value: u16,
}

/// Product identification, from the build descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Product {
    pub code_name: Option<String>,
    pub build_number: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ekey_prefix() {
        let ekey = EKey::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        assert_eq!(ekey.prefix(), [1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(&ekey.as_bytes()[9..], &[0; 7]);

        assert!(EKey::from_slice(&[0; 8]).is_none());
        assert!(EKey::from_slice(&[0; 17]).is_none());
    }

    #[test]
    fn test_feature_ops() {
        let mut f = CascFeatures::DATA_ARCHIVES | CascFeatures::ONLINE;
        assert!(f.contains(CascFeatures::ONLINE));
        assert!(!f.contains(CascFeatures::TAGS));
        f.insert(CascFeatures::TAGS);
        f.remove(CascFeatures::ONLINE);
        assert!(f.contains(CascFeatures::TAGS));
        assert!(!f.contains(CascFeatures::ONLINE));
    }

    #[test]
    fn test_key_display() {
        let ckey = CKey([0xAB; 16]);
        assert_eq!(ckey.to_string(), "ab".repeat(16));
    }
}
