//! The sealed storage handle.
//!
//! Assembly produces an [`Storage`] wrapped in an [`Arc`]; clones of the Arc
//! are the reference count, and dropping the last one tears the storage
//! down (including the online connection-cache slot). The catalog and root
//! handler sit behind one storage-wide `RwLock`: lookups share, post-seal
//! additions take it exclusively.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tact_manifest::config::CdnConfig;

use crate::catalog::{Catalog, CatalogEntry, EntryId, EntrySeed};
use crate::error::{CascError, Result};
use crate::root::RootHandler;
use crate::sockets::SocketCacheGuard;
use crate::types::{
    CKey, CascFeatures, Product, TagInfo, EKEY_PREFIX_LENGTH, PARAM_SEPARATOR,
};

pub(crate) struct StorageInner {
    pub(crate) catalog: Catalog,
    pub(crate) root: Box<dyn RootHandler>,
    pub(crate) tags: Vec<TagInfo>,
    /// Lazily computed info values; cleared by post-seal mutation.
    local_files: Option<u64>,
    total_files: Option<u64>,
}

/// An assembled, read-only CASC storage.
pub struct Storage {
    root_path: PathBuf,
    code_name: Option<String>,
    region: Option<String>,
    build_number: u32,
    default_locale: u32,
    features: CascFeatures,
    cdn_config: Option<CdnConfig>,
    inner: RwLock<StorageInner>,
    /// Keeps the process-wide connection cache alive for online storages.
    _socket_cache: Option<SocketCacheGuard>,
}

impl Storage {
    #[allow(clippy::too_many_arguments, reason = "crate-internal constructor called once")]
    pub(crate) fn seal(
        root_path: PathBuf,
        code_name: Option<String>,
        region: Option<String>,
        build_number: u32,
        default_locale: u32,
        features: CascFeatures,
        cdn_config: Option<CdnConfig>,
        catalog: Catalog,
        root: Box<dyn RootHandler>,
        tags: Vec<TagInfo>,
        socket_cache: Option<SocketCacheGuard>,
    ) -> Arc<Self> {
        Arc::new(Storage {
            root_path,
            code_name,
            region,
            build_number,
            default_locale,
            features,
            cdn_config,
            inner: RwLock::new(StorageInner {
                catalog,
                root,
                tags,
                local_files: None,
                total_files: None,
            }),
            _socket_cache: socket_cache,
        })
    }

    /// Storage features, merged with the root handler's contribution.
    pub fn features(&self) -> CascFeatures {
        self.features | self.inner.read().root.features()
    }

    /// Number of entries resolvable from the local data archives.
    pub fn local_file_count(&self) -> u64 {
        let inner = self.inner.read();
        if let Some(count) = inner.local_files {
            return count;
        }
        drop(inner);

        let mut inner = self.inner.write();
        let count = inner
            .catalog
            .iter()
            .filter(|(_, e)| e.is_file() && e.storage_offset.is_some())
            .count() as u64;
        inner.local_files = Some(count);
        count
    }

    /// Total logical file count: entries referenced by several names count
    /// once per name.
    pub fn total_file_count(&self) -> u64 {
        let inner = self.inner.read();
        if let Some(count) = inner.total_files {
            return count;
        }
        drop(inner);

        let mut inner = self.inner.write();
        let count = inner
            .catalog
            .iter()
            .filter(|(_, e)| e.is_file())
            .map(|(_, e)| u64::from(e.ref_count.max(1)))
            .sum();
        inner.total_files = Some(count);
        count
    }

    /// Locale mask the storage was opened with.
    pub fn installed_locales(&self) -> u32 {
        self.default_locale
    }

    pub fn product(&self) -> Product {
        Product {
            code_name: self.code_name.clone(),
            build_number: self.build_number,
        }
    }

    /// Tags declared by the DOWNLOAD manifest, in declaration order.
    pub fn tags(&self) -> Result<Vec<TagInfo>> {
        let inner = self.inner.read();
        if inner.tags.is_empty() {
            return Err(CascError::NotSupported);
        }
        Ok(inner.tags.clone())
    }

    /// Root path, code name and region joined by the parameter separator.
    pub fn path_product(&self) -> String {
        let mut out = self.root_path.display().to_string();
        if let Some(code_name) = &self.code_name {
            out.push(PARAM_SEPARATOR);
            out.push_str(code_name);
        }
        if let Some(region) = &self.region {
            out.push(PARAM_SEPARATOR);
            out.push_str(region);
        }
        out
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// The CDN configuration document, when one was resolvable.
    pub fn cdn_config(&self) -> Option<&CdnConfig> {
        self.cdn_config.as_ref()
    }

    pub fn file_count(&self) -> usize {
        self.inner.read().catalog.len()
    }

    /// Snapshot of the entry behind a content digest.
    pub fn entry_by_ckey(&self, ckey: &CKey) -> Option<CatalogEntry> {
        let inner = self.inner.read();
        let id = inner.catalog.find_by_ckey(ckey)?;
        Some(inner.catalog.entry(id).clone())
    }

    /// Snapshot of the entry behind an encoded-digest prefix.
    pub fn entry_by_ekey(&self, prefix: &[u8; EKEY_PREFIX_LENGTH]) -> Option<CatalogEntry> {
        let inner = self.inner.read();
        let id = inner.catalog.find_by_ekey(prefix)?;
        Some(inner.catalog.entry(id).clone())
    }

    /// Resolve a logical name through the root handler.
    pub fn resolve(&self, name: &str) -> Option<CatalogEntry> {
        let inner = self.inner.read();
        let id = inner.root.resolve(name)?;
        Some(inner.catalog.entry(id).clone())
    }

    /// Run a closure over the sealed catalog under the shared lock.
    pub fn with_catalog<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        f(&self.inner.read().catalog)
    }

    /// Post-seal addition: catalog a blob first met by digest after open
    /// (e.g. a cross-referenced span). Takes the exclusive lock and
    /// invalidates the cached counts.
    pub fn insert_lazy(&self, seed: EntrySeed) -> Result<EntryId> {
        let mut inner = self.inner.write();
        let id = inner.catalog.insert_or_merge(seed)?;
        inner.local_files = None;
        inner.total_files = None;
        Ok(id)
    }
}
