//! The unified file catalog: one entry per unique blob known to the storage,
//! indexed by content digest and by encoded-digest prefix.
//!
//! Entries are kept in a pre-sized arena and addressed by [`EntryId`];
//! handles stay valid for the life of the storage. The arena never grows
//! past the reservation: the capacity estimate undercounting is a fatal
//! configuration error, not a resize.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{CascError, Result};
use crate::types::{ArchiveLocation, CKey, EKey, EntryFlags, EKEY_PREFIX_LENGTH};

/// Extra slots reserved on top of the manifest-derived estimate, for
/// well-known files and lazy post-seal additions.
const EXTRA_ENTRIES: usize = 64;

/// Assumed file count when neither manifest size is known up front.
const DEFAULT_FILE_COUNT: usize = 1_000_000;

/// Minimum bytes per ENCODING record: count, size, ckey, one ekey.
const ENCODING_ENTRY_SIZE: usize = 2 + 4 + 16 + 16;

/// Minimum bytes per DOWNLOAD entry: ekey, size, priority.
const DOWNLOAD_ENTRY_SIZE: usize = 16 + 5 + 1;

/// Stable handle to a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One file known to the storage.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Content digest; zero when the entry was only ever seen by EKey.
    pub ckey: CKey,
    /// Encoded digest; the first 9 bytes are authoritative.
    pub ekey: EKey,
    /// Where the encoded blob lives in the local archives, if anywhere.
    pub storage_offset: Option<ArchiveLocation>,
    /// Size of the encoded blob, if known.
    pub encoded_size: Option<u32>,
    /// Decoded size, if known.
    pub content_size: Option<u32>,
    /// Number of data-archive spans the blob occupies.
    pub span_count: u8,
    /// Number of logical names referencing this entry.
    pub ref_count: u32,
    /// Bit i set iff the i-th DOWNLOAD tag covers this entry.
    pub tag_bitmask: u64,
    /// DOWNLOAD priority; 0 when absent.
    pub priority: i8,
    pub flags: EntryFlags,
}

impl CatalogEntry {
    /// Whether this entry counts as a storage file for the info surface.
    /// Well-known manifest entries are bookkeeping, not content.
    pub fn is_file(&self) -> bool {
        !self.flags.contains(EntryFlags::IN_BUILD)
    }
}

/// Initial attributes for [`Catalog::insert_or_merge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EntrySeed {
    pub ckey: Option<CKey>,
    pub ekey: Option<EKey>,
    pub content_size: Option<u32>,
    pub encoded_size: Option<u32>,
    pub flags: EntryFlags,
}

/// Estimate the total file count from the manifest sizes named by the CDN
/// build document: one ENCODING record is at least 38 bytes, one DOWNLOAD
/// entry at least 22. Older builds state neither size; assume a million
/// files rather than re-allocating mid-ingest.
pub fn estimate_file_count(encoding_size: Option<u32>, download_size: Option<u32>) -> usize {
    let from_encoding = encoding_size.map(|s| s as usize / ENCODING_ENTRY_SIZE + EXTRA_ENTRIES);
    let from_download = download_size.map(|s| s as usize / DOWNLOAD_ENTRY_SIZE + EXTRA_ENTRIES);

    match (from_encoding, from_download) {
        (None, None) => DEFAULT_FILE_COUNT,
        (a, b) => a.unwrap_or(0).max(b.unwrap_or(0)),
    }
}

/// The catalog: entry arena plus the two digest indexes.
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    capacity: usize,
    by_ckey: HashMap<CKey, EntryId>,
    by_ekey: HashMap<[u8; EKEY_PREFIX_LENGTH], EntryId>,
}

impl Catalog {
    /// Create a catalog sized for `capacity` entries. All ingest must fit;
    /// see [`Catalog::insert_or_merge`].
    pub fn with_capacity(capacity: usize) -> Self {
        Catalog {
            entries: Vec::with_capacity(capacity),
            capacity,
            by_ckey: HashMap::with_capacity(capacity),
            by_ekey: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &CatalogEntry {
        &self.entries[id.index()]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut CatalogEntry {
        &mut self.entries[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &CatalogEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (EntryId(i as u32), e))
    }

    pub fn find_by_ckey(&self, ckey: &CKey) -> Option<EntryId> {
        self.by_ckey.get(ckey).copied()
    }

    pub fn find_by_ekey(&self, prefix: &[u8; EKEY_PREFIX_LENGTH]) -> Option<EntryId> {
        self.by_ekey.get(prefix).copied()
    }

    /// Insert a new entry or merge into the one already indexed by either
    /// digest. Merging widens unknown fields and never overwrites known
    /// ones, except that a full encoded digest replaces a partial one.
    ///
    /// Seeds carrying neither digest are rejected. Appending past the
    /// reservation is [`CascError::CapacityExceeded`]: handles to entries
    /// are long-lived, so the arena must never relocate.
    pub fn insert_or_merge(&mut self, seed: EntrySeed) -> Result<EntryId> {
        let ckey = seed.ckey.filter(|k| !k.is_zero());
        let ekey = seed.ekey.filter(|k| !k.is_zero());
        if ckey.is_none() && ekey.is_none() {
            return Err(CascError::InvalidParameter);
        }

        if let Some(ckey) = &ckey {
            if let Some(id) = self.find_by_ckey(ckey) {
                self.merge(id, &seed);
                return Ok(id);
            }
        }
        if let Some(ekey) = &ekey {
            if let Some(id) = self.find_by_ekey(&ekey.prefix()) {
                self.merge(id, &seed);
                return Ok(id);
            }
        }

        if self.entries.len() >= self.capacity {
            return Err(CascError::CapacityExceeded);
        }

        let id = EntryId(self.entries.len() as u32);
        self.entries.push(CatalogEntry {
            ckey: ckey.unwrap_or(CKey::ZERO),
            ekey: ekey.unwrap_or(EKey::ZERO),
            storage_offset: None,
            encoded_size: seed.encoded_size,
            content_size: seed.content_size,
            span_count: 1,
            ref_count: 0,
            tag_bitmask: 0,
            priority: 0,
            flags: seed.flags,
        });

        if let Some(ckey) = ckey {
            self.by_ckey.insert(ckey, id);
        }
        if let Some(ekey) = ekey {
            self.by_ekey.insert(ekey.prefix(), id);
        }

        Ok(id)
    }

    fn merge(&mut self, id: EntryId, seed: &EntrySeed) {
        let entry = &mut self.entries[id.index()];

        if entry.content_size.is_none() {
            entry.content_size = seed.content_size;
        }
        if entry.encoded_size.is_none() {
            entry.encoded_size = seed.encoded_size;
        }

        // A full encoded digest replaces a partial one. The 9-byte prefix is
        // identical, so the index needs no update.
        if entry.flags.contains(EntryFlags::HAS_EKEY_PARTIAL) {
            if let Some(ekey) = seed.ekey {
                if seed.flags.contains(EntryFlags::HAS_EKEY)
                    && !seed.flags.contains(EntryFlags::HAS_EKEY_PARTIAL)
                {
                    entry.ekey = ekey;
                    entry.flags.remove(EntryFlags::HAS_EKEY_PARTIAL);
                }
            }
        }

        // Widen digests the entry did not have yet, keeping both indexes in
        // agreement about the entry's identity.
        if let Some(ckey) = seed.ckey {
            if !entry.flags.contains(EntryFlags::HAS_CKEY) && !ckey.is_zero() {
                entry.ckey = ckey;
                entry.flags.insert(EntryFlags::HAS_CKEY);
                let entry_ckey = entry.ckey;
                if let Some(&other) = self.by_ckey.get(&entry_ckey) {
                    if other != id {
                        warn!("CKey {entry_ckey} already indexed by a different entry");
                    }
                } else {
                    self.by_ckey.insert(entry_ckey, id);
                }
            }
        }
        if let Some(ekey) = seed.ekey {
            if !entry.flags.contains(EntryFlags::HAS_EKEY) && !ekey.is_zero() {
                entry.ekey = ekey;
                entry.flags.insert(EntryFlags::HAS_EKEY);
                if seed.flags.contains(EntryFlags::HAS_EKEY_PARTIAL) {
                    entry.flags.insert(EntryFlags::HAS_EKEY_PARTIAL);
                }
                let prefix = ekey.prefix();
                if let Some(&other) = self.by_ekey.get(&prefix) {
                    if other != id {
                        warn!("EKey prefix already indexed by a different entry");
                    }
                } else {
                    self.by_ekey.insert(prefix, id);
                }
            }
        }

        let entry = &mut self.entries[id.index()];
        let mut incoming = seed.flags;
        incoming.remove(EntryFlags::HAS_CKEY | EntryFlags::HAS_EKEY | EntryFlags::HAS_EKEY_PARTIAL);
        entry.flags.insert(incoming);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ckey(b: u8) -> CKey {
        CKey([b; 16])
    }

    fn ekey(b: u8) -> EKey {
        EKey([b; 16])
    }

    #[test]
    fn test_insert_and_find() {
        let mut catalog = Catalog::with_capacity(4);
        let id = catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                ekey: Some(ekey(2)),
                content_size: Some(100),
                flags: EntryFlags::HAS_CKEY | EntryFlags::HAS_EKEY | EntryFlags::IN_ENCODING,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(catalog.find_by_ckey(&ckey(1)), Some(id));
        assert_eq!(catalog.find_by_ekey(&[2; 9]), Some(id));
        assert_eq!(catalog.entry(id).content_size, Some(100));
        assert_eq!(catalog.entry(id).encoded_size, None);
    }

    #[test]
    fn test_merge_by_ekey_widens_fields() {
        let mut catalog = Catalog::with_capacity(4);
        let a = catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                ekey: Some(ekey(2)),
                content_size: Some(100),
                flags: EntryFlags::HAS_CKEY | EntryFlags::HAS_EKEY | EntryFlags::IN_ENCODING,
                ..Default::default()
            })
            .unwrap();

        // Same blob surfacing in DOWNLOAD: looked up by EKey, brings the
        // encoded size.
        let b = catalog
            .insert_or_merge(EntrySeed {
                ekey: Some(ekey(2)),
                encoded_size: Some(77),
                flags: EntryFlags::HAS_EKEY | EntryFlags::IN_DOWNLOAD,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(catalog.len(), 1);
        let entry = catalog.entry(a);
        assert_eq!(entry.content_size, Some(100));
        assert_eq!(entry.encoded_size, Some(77));
        assert!(entry
            .flags
            .contains(EntryFlags::IN_ENCODING | EntryFlags::IN_DOWNLOAD));
    }

    #[test]
    fn test_merge_never_overwrites_known_sizes() {
        let mut catalog = Catalog::with_capacity(4);
        let id = catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                content_size: Some(100),
                flags: EntryFlags::HAS_CKEY,
                ..Default::default()
            })
            .unwrap();

        catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                content_size: Some(999),
                flags: EntryFlags::HAS_CKEY,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(catalog.entry(id).content_size, Some(100));
    }

    #[test]
    fn test_full_ekey_replaces_partial() {
        let mut catalog = Catalog::with_capacity(4);
        let partial = EKey::from_slice(&[5; 9]).unwrap();
        let id = catalog
            .insert_or_merge(EntrySeed {
                ekey: Some(partial),
                flags: EntryFlags::HAS_EKEY | EntryFlags::HAS_EKEY_PARTIAL,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(&catalog.entry(id).ekey.as_bytes()[9..], &[0; 7]);

        let full = ekey(5);
        let merged = catalog
            .insert_or_merge(EntrySeed {
                ekey: Some(full),
                flags: EntryFlags::HAS_EKEY | EntryFlags::IN_DOWNLOAD,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(id, merged);
        let entry = catalog.entry(id);
        assert_eq!(entry.ekey, full);
        assert!(!entry.flags.contains(EntryFlags::HAS_EKEY_PARTIAL));
    }

    #[test]
    fn test_late_ckey_joins_both_indexes() {
        let mut catalog = Catalog::with_capacity(4);
        let id = catalog
            .insert_or_merge(EntrySeed {
                ekey: Some(ekey(3)),
                flags: EntryFlags::HAS_EKEY | EntryFlags::IN_DOWNLOAD,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(catalog.find_by_ckey(&ckey(9)), None);

        catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(9)),
                ekey: Some(ekey(3)),
                flags: EntryFlags::HAS_CKEY | EntryFlags::HAS_EKEY,
                ..Default::default()
            })
            .unwrap();

        // Both indexes agree on the entry's identity.
        assert_eq!(catalog.find_by_ckey(&ckey(9)), Some(id));
        assert_eq!(catalog.find_by_ekey(&[3; 9]), Some(id));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_rejects_keyless_seed() {
        let mut catalog = Catalog::with_capacity(4);
        assert!(matches!(
            catalog.insert_or_merge(EntrySeed::default()),
            Err(CascError::InvalidParameter)
        ));
    }

    #[test]
    fn test_capacity_is_a_hard_limit() {
        let mut catalog = Catalog::with_capacity(1);
        catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                flags: EntryFlags::HAS_CKEY,
                ..Default::default()
            })
            .unwrap();

        let err = catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(2)),
                flags: EntryFlags::HAS_CKEY,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CascError::CapacityExceeded));

        // Merging into an existing entry is still fine at capacity.
        catalog
            .insert_or_merge(EntrySeed {
                ckey: Some(ckey(1)),
                encoded_size: Some(5),
                flags: EntryFlags::HAS_CKEY,
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_estimate_file_count() {
        assert_eq!(estimate_file_count(None, None), 1_000_000);
        assert_eq!(estimate_file_count(Some(380), None), 10 + 64);
        assert_eq!(estimate_file_count(None, Some(220)), 10 + 64);
        // Larger estimate wins
        assert_eq!(estimate_file_count(Some(380), Some(2200)), 100 + 64);
    }
}
