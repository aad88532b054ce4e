//! Root handler seam.
//!
//! A root manifest maps logical file names onto catalog entries. The
//! concrete decoders (TVFS, per-game formats) plug in through
//! [`RootFactory`]; the engine itself only needs the name table, the
//! dispatch chain, and the INSTALL-manifest fallback.

use std::collections::HashMap;

use tact_manifest::install::InstallManifest;
use tracing::debug;

use crate::catalog::{Catalog, EntryId, EntrySeed};
use crate::error::Result;
use crate::types::{CKey, CascFeatures, EntryFlags};

/// A name table over catalog entries.
pub trait RootHandler: Send + Sync {
    /// Bind `name` to a catalog entry. Binding an already-known name
    /// replaces the old target.
    fn insert(&mut self, name: &str, id: EntryId);

    /// Resolve a logical name.
    fn resolve(&self, name: &str) -> Option<EntryId>;

    /// Adopt every name binding of `other` that this handler does not
    /// already have. Used when a reparse replaces the handler.
    fn copy_from(&mut self, other: &dyn RootHandler);

    /// Extra features the root format contributes to the storage.
    fn features(&self) -> CascFeatures {
        CascFeatures::default()
    }

    /// Visit every name binding.
    fn enumerate(&self, f: &mut dyn FnMut(&str, EntryId));
}

/// Outcome of probing root bytes against one decoder.
pub enum RootDispatch {
    /// Format recognized, handler built.
    Ready(Box<dyn RootHandler>),
    /// Format recognized, but it delegates to the legacy ROOT file. The
    /// partial handler's names survive into the retry via `copy_from`.
    Reparse(Box<dyn RootHandler>),
    /// Not this decoder's format; try the next one.
    Unrecognized,
}

/// A root format decoder. Receives the raw root bytes, the locale mask, and
/// the catalog (entries may be inserted or referenced while decoding).
pub type RootFactory =
    Box<dyn Fn(&[u8], u32, &mut Catalog) -> Result<RootDispatch> + Send + Sync>;

/// Plain name→entry map; the base every storage falls back to.
#[derive(Default)]
pub struct FileTreeRoot {
    names: HashMap<String, EntryId>,
    features: CascFeatures,
}

impl FileTreeRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features(features: CascFeatures) -> Self {
        FileTreeRoot {
            names: HashMap::new(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl RootHandler for FileTreeRoot {
    fn insert(&mut self, name: &str, id: EntryId) {
        self.names.insert(name.to_string(), id);
    }

    fn resolve(&self, name: &str) -> Option<EntryId> {
        self.names.get(name).copied()
    }

    fn copy_from(&mut self, other: &dyn RootHandler) {
        other.enumerate(&mut |name, id| {
            self.names.entry(name.to_string()).or_insert(id);
        });
    }

    fn features(&self) -> CascFeatures {
        self.features
    }

    fn enumerate(&self, f: &mut dyn FnMut(&str, EntryId)) {
        for (name, id) in &self.names {
            f(name, *id);
        }
    }
}

/// Build the fallback root from an INSTALL manifest: every installed file
/// name resolves to its content entry, so a name-resolving catalog exists
/// even without a decodable ROOT.
pub fn install_root(manifest: &InstallManifest, catalog: &mut Catalog) -> Result<FileTreeRoot> {
    let mut root = FileTreeRoot::new();

    for entry in &manifest.entries {
        let Some(ckey) = CKey::from_slice(&entry.ckey) else {
            continue;
        };
        let id = catalog.insert_or_merge(EntrySeed {
            ckey: Some(ckey),
            content_size: Some(entry.size),
            flags: EntryFlags::HAS_CKEY,
            ..Default::default()
        })?;
        catalog.entry_mut(id).ref_count += 1;
        root.insert(&entry.path, id);
    }

    debug!("Built INSTALL fallback root with {} names", root.len());
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> EntryId {
        // EntryIds are opaque; fabricate them through a scratch catalog.
        let mut catalog = Catalog::with_capacity(i as usize + 1);
        let mut last = None;
        for n in 0..=i {
            last = Some(
                catalog
                    .insert_or_merge(EntrySeed {
                        ckey: Some(CKey([n as u8 + 1; 16])),
                        flags: EntryFlags::HAS_CKEY,
                        ..Default::default()
                    })
                    .unwrap(),
            );
        }
        last.unwrap()
    }

    #[test]
    fn test_file_tree_root_basics() {
        let mut root = FileTreeRoot::new();
        root.insert("ENCODING", id(0));
        root.insert("a/b.txt", id(1));

        assert_eq!(root.resolve("a/b.txt"), Some(id(1)));
        assert_eq!(root.resolve("missing"), None);
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_copy_from_keeps_own_bindings() {
        let mut old = FileTreeRoot::new();
        old.insert("shared", id(0));
        old.insert("only-old", id(1));

        let mut new = FileTreeRoot::new();
        new.insert("shared", id(2));
        new.copy_from(&old);

        // The new handler's binding wins; missing ones are adopted.
        assert_eq!(new.resolve("shared"), Some(id(2)));
        assert_eq!(new.resolve("only-old"), Some(id(1)));
    }

    #[test]
    fn test_install_root_bumps_ref_counts() {
        let mut data = Vec::new();
        data.extend_from_slice(b"IN");
        data.push(1);
        data.push(16);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"game.exe\0");
        data.extend_from_slice(&[7u8; 16]);
        data.extend_from_slice(&4096u32.to_be_bytes());

        let manifest = InstallManifest::parse(&data).unwrap();
        let mut catalog = Catalog::with_capacity(4);
        let root = install_root(&manifest, &mut catalog).unwrap();

        let id = root.resolve("game.exe").unwrap();
        let entry = catalog.entry(id);
        assert_eq!(entry.ref_count, 1);
        assert_eq!(entry.content_size, Some(4096));
        assert_eq!(entry.ckey, CKey([7; 16]));
    }
}
