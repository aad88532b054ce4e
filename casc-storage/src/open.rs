//! The assembly orchestrator.
//!
//! `open_storage` runs the stage pipeline: build descriptor, CDN config and
//! build documents, catalog reservation, local index, ENCODING, DOWNLOAD,
//! ROOT (with the reparse transition and the INSTALL fallback), well-known
//! name insertion, encryption keys. Any fatal stage error unwinds the whole
//! attempt; a failed or cancelled open leaves no side effects.

use std::path::PathBuf;
use std::sync::Arc;

use tact_manifest::build_file::{BuildDescriptor, BuildDescriptorKind, RowSelector};
use tact_manifest::config::{CdnBuildConfig, CdnConfig, ConfigParsable};
use tact_manifest::download::DownloadManifest;
use tact_manifest::encoding::{visit_ckey_pages, EncodingHeader};
use tact_manifest::install::InstallManifest;
use tact_manifest::{MaybePair, Md5};
use tracing::{debug, info, warn};

use crate::blockio::{BlockReader, FrameDecoder, IdentityDecoder, KeyStore, NullKeyStore, RemoteKind};
use crate::catalog::{estimate_file_count, Catalog, EntryId, EntrySeed};
use crate::descriptor::{config_path, data_directory, locate_build_file};
use crate::error::{CascError, Result};
use crate::index::IndexView;
use crate::root::{FileTreeRoot, RootDispatch, RootFactory, RootHandler};
use crate::sockets::SocketCacheGuard;
use crate::storage::Storage;
use crate::types::{CKey, CascFeatures, EKey, EntryFlags, TagInfo, PARAM_SEPARATOR};

/// Progress callback: invoked with a stage description before each blocking
/// stage and at the start of every ENCODING page. Returning `true` cancels
/// the open with [`CascError::Cancelled`].
pub type ProgressCallback = Box<dyn FnMut(&str) -> bool + Send>;

/// Everything `open_storage` accepts besides the parameter string. Fields
/// present in both the string and the args conflict and fail the open.
pub struct OpenArgs {
    /// Storage directory, or the local cache directory for online storages.
    pub local_path: Option<PathBuf>,
    /// Custom CDN host.
    pub cdn_host_url: Option<String>,
    /// Product code name ("wow", "agent", ...).
    pub code_name: Option<String>,
    /// Region / branch selector for the descriptor row.
    pub region: Option<String>,
    /// Hex prefix of a specific CDN build key to open.
    pub build_key: Option<String>,
    /// Locale mask forwarded to the root decoder; 0 means the descriptor's
    /// default, falling back to all locales.
    pub locale_mask: u32,
    /// Allow fetching missing documents from the CDN.
    pub online: bool,
    /// Treat all content as remote even when archives exist.
    pub force_download: bool,
    /// Verify the MD5 of every ENCODING page. Costly; off by default.
    pub verify_page_hashes: bool,
    pub progress: Option<ProgressCallback>,
    /// Block device over archives and the CDN.
    pub block_reader: Option<Box<dyn BlockReader>>,
    /// Frame codec for the in-storage manifests.
    pub frame_decoder: Box<dyn FrameDecoder>,
    pub key_store: Box<dyn KeyStore>,
    /// Root format decoders, probed in order.
    pub root_factories: Vec<RootFactory>,
}

impl Default for OpenArgs {
    fn default() -> Self {
        OpenArgs {
            local_path: None,
            cdn_host_url: None,
            code_name: None,
            region: None,
            build_key: None,
            locale_mask: 0,
            online: false,
            force_download: false,
            verify_page_hashes: false,
            progress: None,
            block_reader: None,
            frame_decoder: Box::new(IdentityDecoder),
            key_store: Box::new(NullKeyStore),
            root_factories: Vec::new(),
        }
    }
}

/// A URL slot is recognized by "://", a dot, or a slash.
fn is_url(segment: &str) -> bool {
    segment.contains("://") || segment.contains('.') || segment.contains('/')
}

fn set_string(slot: &mut Option<String>, value: &str) -> Result<()> {
    if slot.as_deref().is_some_and(|v| !v.is_empty()) {
        return Err(CascError::InvalidParameter);
    }
    *slot = Some(value.to_string());
    Ok(())
}

/// Parse the open-parameter string into `args`, greedily left to right:
///
/// ```text
/// local_path [ * url ] [ * code_name [ * region ] ]
/// ```
///
/// A segment fills the URL slot only if it looks like a URL; otherwise it is
/// taken as the code name. A value that is also pre-set in `args` is a
/// conflict.
pub(crate) fn apply_params(params: &str, args: &mut OpenArgs) -> Result<()> {
    let mut segments = params.split(PARAM_SEPARATOR);

    let local_path = segments.next().unwrap_or_default();
    if local_path.is_empty() {
        return Err(CascError::InvalidParameter);
    }
    if args.local_path.is_some() {
        return Err(CascError::InvalidParameter);
    }
    args.local_path = Some(PathBuf::from(local_path));

    let rest: Vec<&str> = segments.collect();
    let mut next = 0;

    if rest.first().is_some_and(|s| is_url(s)) {
        set_string(&mut args.cdn_host_url, rest[0])?;
        next = 1;
    }
    if let Some(code_name) = rest.get(next) {
        set_string(&mut args.code_name, code_name)?;
    }
    if let Some(region) = rest.get(next + 1) {
        set_string(&mut args.region, region)?;
    }
    if rest.len() > next + 2 {
        warn!("Ignoring {} extra parameter segment(s)", rest.len() - next - 2);
    }

    Ok(())
}

/// A well-known file as the CDN build document names it.
#[derive(Debug, Clone, Copy, Default)]
struct WellKnown {
    ckey: Option<CKey>,
    ekey: Option<EKey>,
    content_size: Option<u32>,
}

impl WellKnown {
    fn from_pair(keys: Option<MaybePair<Md5>>, sizes: Option<MaybePair<u32>>) -> Self {
        WellKnown {
            ckey: keys.map(|p| CKey(p.first())),
            ekey: keys.and_then(|p| p.second()).map(EKey),
            content_size: sizes.map(|p| p.first()),
        }
    }

    fn from_exact(keys: Option<(Md5, Md5)>, sizes: Option<(u32, u32)>) -> Self {
        WellKnown {
            ckey: keys.map(|(c, _)| CKey(c)),
            ekey: keys.map(|(_, e)| EKey(e)),
            content_size: sizes.map(|(c, _)| c),
        }
    }

    fn seed(&self) -> Option<EntrySeed> {
        let mut flags = EntryFlags::IN_BUILD;
        if self.ckey.is_some() {
            flags.insert(EntryFlags::HAS_CKEY);
        }
        if self.ekey.is_some() {
            flags.insert(EntryFlags::HAS_EKEY);
        }
        if self.ckey.is_none() && self.ekey.is_none() {
            return None;
        }
        Some(EntrySeed {
            ckey: self.ckey,
            ekey: self.ekey,
            content_size: self.content_size,
            encoded_size: None,
            flags,
        })
    }
}

/// The set of well-known files of one build.
struct WellKnownFiles {
    encoding: WellKnown,
    download: WellKnown,
    install: WellKnown,
    patch: WellKnown,
    root: WellKnown,
    size: WellKnown,
    vfs_root: WellKnown,
}

impl WellKnownFiles {
    fn from_config(build: &CdnBuildConfig) -> Self {
        WellKnownFiles {
            encoding: WellKnown::from_pair(build.encoding, build.encoding_size),
            download: WellKnown::from_pair(build.download, build.download_size),
            install: WellKnown::from_pair(build.install, build.install_size),
            // The patch document is addressed by an encoded key only and is
            // never part of ENCODING.
            patch: WellKnown {
                ckey: None,
                ekey: build.patch.map(EKey),
                content_size: build.patch_size,
            },
            root: WellKnown {
                ckey: build.root.map(CKey),
                ekey: None,
                content_size: None,
            },
            size: WellKnown::from_exact(build.size, build.size_size),
            vfs_root: WellKnown::from_exact(build.vfs_root, build.vfs_root_size),
        }
    }
}

struct OpenContext {
    root_path: PathBuf,
    online: bool,
    block_reader: Option<Box<dyn BlockReader>>,
    frame_decoder: Box<dyn FrameDecoder>,
    progress: Option<ProgressCallback>,
    verify_page_hashes: bool,
    index: IndexView,
}

impl OpenContext {
    fn poll(&mut self, stage: &str) -> Result<()> {
        if let Some(progress) = &mut self.progress {
            if progress(stage) {
                return Err(CascError::Cancelled);
            }
        }
        Ok(())
    }

    /// Fetch a config document: local config tree first, CDN second.
    fn load_config_document(&self, key: &Md5) -> Result<String> {
        let path = config_path(&self.root_path, key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.online {
                    if let Some(reader) = &self.block_reader {
                        let bytes = reader.read_remote(RemoteKind::Config, key)?;
                        return String::from_utf8(bytes).map_err(|_| CascError::BadFormat);
                    }
                }
                Err(CascError::FileNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and decode an in-storage manifest through its catalog entry:
    /// local archives when the index resolved it, the CDN otherwise.
    fn load_internal_file(&self, catalog: &Catalog, id: EntryId) -> Result<Vec<u8>> {
        let entry = catalog.entry(id);

        if let Some(location) = entry.storage_offset {
            if let Some(reader) = &self.block_reader {
                let encoded = reader.read_local(&location)?;
                return self.frame_decoder.decode(&encoded);
            }
        }

        if self.online && entry.flags.contains(EntryFlags::HAS_EKEY) {
            if let Some(reader) = &self.block_reader {
                let kind = if entry.flags.contains(EntryFlags::FILE_PATCH) {
                    RemoteKind::Patch
                } else {
                    RemoteKind::Data
                };
                let encoded = reader.read_remote(kind, entry.ekey.as_bytes())?;
                return self.frame_decoder.decode(&encoded);
            }
        }

        Err(CascError::FileNotFound)
    }
}

/// Open a storage.
///
/// `params` is the compact form (`local_path*url*code_name*region`); every
/// field can equally be given through `args`, but not through both.
pub fn open_storage(params: Option<&str>, mut args: OpenArgs) -> Result<Arc<Storage>> {
    if let Some(params) = params {
        apply_params(params, &mut args)?;
    }
    let local_path = args.local_path.take().ok_or(CascError::InvalidParameter)?;

    let mut ctx = OpenContext {
        root_path: local_path.clone(),
        online: args.online,
        block_reader: args.block_reader.take(),
        frame_decoder: std::mem::replace(&mut args.frame_decoder, Box::new(IdentityDecoder)),
        progress: args.progress.take(),
        verify_page_hashes: args.verify_page_hashes,
        index: IndexView::default(),
    };

    // Stage 1: the build descriptor.
    ctx.poll("Loading build descriptor")?;
    let (descriptor_text, kind) = match locate_build_file(&local_path) {
        Ok(located) => {
            ctx.root_path = located.root;
            (std::fs::read_to_string(&located.path)?, located.kind)
        }
        Err(CascError::FileNotFound) if args.online => {
            // No local descriptor; fetch "versions" from the CDN. Requires
            // the product code.
            let code_name = args.code_name.as_deref().ok_or(CascError::FileNotFound)?;
            let reader = ctx.block_reader.as_ref().ok_or(CascError::FileNotFound)?;
            let bytes = reader.fetch_descriptor(code_name)?;
            let text = String::from_utf8(bytes).map_err(|_| CascError::BadFormat)?;
            (text, BuildDescriptorKind::Versions)
        }
        Err(e) => return Err(e),
    };

    let mut features = CascFeatures::default();
    if args.online || kind == BuildDescriptorKind::Versions {
        features.insert(CascFeatures::ONLINE);
        ctx.online = true;
    }
    if args.force_download {
        features.insert(CascFeatures::FORCE_DOWNLOAD);
    }
    let socket_cache = ctx.online.then(SocketCacheGuard::acquire);

    let selector = RowSelector {
        region: args.region.as_deref(),
        build_key: args.build_key.as_deref(),
    };
    let descriptor = BuildDescriptor::parse(kind, &descriptor_text, &selector)?;
    let cdn_build_key = descriptor.cdn_build_key.ok_or(CascError::BadFormat)?;

    let data_dir = data_directory(&ctx.root_path);
    if data_dir.is_some() {
        features.insert(CascFeatures::DATA_ARCHIVES | CascFeatures::DATA_FILES);
    }

    // Stage 2: CDN config and CDN build documents. A missing CDN config is
    // tolerated offline; the CDN build document is required.
    ctx.poll("Loading CDN configuration")?;
    let cdn_config = match descriptor.cdn_config_key {
        Some(key) => match ctx.load_config_document(&key) {
            Ok(text) => Some(CdnConfig::parse_config(text.as_bytes())?),
            Err(CascError::FileNotFound) if !ctx.online => {
                debug!("CDN config missing and storage is offline; continuing");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };
    if let Some(config) = &cdn_config {
        debug!(
            "CDN config: {} archives, {} patch archives",
            config.archives.as_deref().map_or(0, <[Md5]>::len),
            config.patch_archives.as_deref().map_or(0, <[Md5]>::len),
        );
    }

    let build_text = ctx.load_config_document(&cdn_build_key)?;
    let build = CdnBuildConfig::parse_config(build_text.as_bytes())?;
    if build.encoding.is_none() {
        return Err(CascError::FileNotFound);
    }
    let well_known = WellKnownFiles::from_config(&build);

    // Reserve the catalog. Entry handles are long-lived, so the estimate
    // must cover all ingest up front.
    let estimate = estimate_file_count(
        build.encoding_size.map(|p| p.first()),
        build.download_size.map(|p| p.first()),
    );
    let mut catalog = Catalog::with_capacity(estimate);
    debug!("Reserved catalog capacity for {estimate} entries");

    // Local index files.
    if let Some(dir) = &data_dir {
        ctx.index = IndexView::load_directory(dir)?;
    }

    // Stage 3: ENCODING.
    ctx.poll("Loading ENCODING manifest")?;
    load_encoding(&mut ctx, &mut catalog, &well_known)?;

    // Stage 4: DOWNLOAD. Missing is non-fatal.
    ctx.poll("Loading DOWNLOAD manifest")?;
    let tags = load_download(&mut ctx, &mut catalog, &well_known, &mut features)?;

    // Stage 5: ROOT, with the INSTALL fallback.
    ctx.poll("Loading ROOT manifest")?;
    let locale_mask = match (args.locale_mask, descriptor.default_locale) {
        (0, 0) => 0xFFFF_FFFF,
        (0, default) => default,
        (mask, _) => mask,
    };
    let mut root = load_root_with_fallback(
        &mut ctx,
        &mut catalog,
        &well_known,
        &args.root_factories,
        locale_mask,
    )?;

    // Well-known names. Must follow ROOT: the handler they go into is the
    // one that survives.
    insert_well_known_files(&mut catalog, root.as_mut(), &well_known, ctx.online)?;

    // Encryption keys.
    args.key_store.load_keys(&catalog)?;

    let build_number = descriptor
        .build_number
        .or(build.build_num)
        // Builds predating build numbers in descriptors: derive a stable
        // pseudo-number from the INSTALL size, like the reference client.
        .unwrap_or_else(|| 21742 + well_known.install.content_size.unwrap_or(0));

    let code_name = args
        .code_name
        .clone()
        .or(descriptor.product.clone())
        .or(build.build_uid.clone());

    info!(
        "Storage open: {} catalog entries, build {build_number}, features {:#x}",
        catalog.len(),
        features.0
    );

    Ok(Storage::seal(
        ctx.root_path,
        code_name,
        args.region.clone(),
        build_number,
        descriptor.default_locale,
        features,
        cdn_config,
        catalog,
        root,
        tags,
        socket_cache,
    ))
}

/// Ingest the ENCODING manifest, then seed the catalog with the other
/// well-known entries the build document names.
fn load_encoding(
    ctx: &mut OpenContext,
    catalog: &mut Catalog,
    well_known: &WellKnownFiles,
) -> Result<()> {
    // The ENCODING file describes everything else, so its own entry comes
    // from the build document alone.
    let seed = well_known.encoding.seed().ok_or(CascError::FileNotFound)?;
    let encoding_id = catalog.insert_or_merge(seed)?;
    ctx.index.apply_to(catalog.entry_mut(encoding_id));

    let data = ctx.load_internal_file(catalog, encoding_id)?;
    let header = EncodingHeader::parse(&data)?;

    let mut page_progress = std::mem::take(&mut ctx.progress);
    let index = std::mem::take(&mut ctx.index);
    let verify = ctx.verify_page_hashes;

    let mut record_count = 0usize;
    let walk = visit_ckey_pages::<CascError>(
        &data,
        &header,
        verify,
        &mut |_page| {
            if let Some(progress) = &mut page_progress {
                if progress("Loading ENCODING manifest") {
                    return Err(CascError::Cancelled);
                }
            }
            Ok(())
        },
        &mut |record| {
            let ckey = CKey::from_slice(record.ckey).ok_or(CascError::FileCorrupt)?;
            let ekey = EKey::from_slice(record.first_ekey()).ok_or(CascError::FileCorrupt)?;
            let id = catalog.insert_or_merge(EntrySeed {
                ckey: Some(ckey),
                ekey: Some(ekey),
                content_size: Some(record.content_size),
                encoded_size: None,
                flags: EntryFlags::HAS_CKEY | EntryFlags::HAS_EKEY | EntryFlags::IN_ENCODING,
            })?;
            index.apply_to(catalog.entry_mut(id));
            record_count += 1;
            Ok(())
        },
    );
    ctx.progress = page_progress;
    ctx.index = index;
    walk?;
    debug!("ENCODING contributed {record_count} records");

    // Seed the remaining well-known entries so DOWNLOAD and ROOT can
    // resolve them by digest.
    for wk in [
        &well_known.download,
        &well_known.install,
        &well_known.root,
        &well_known.size,
        &well_known.vfs_root,
    ] {
        if let Some(seed) = wk.seed() {
            let id = catalog.insert_or_merge(seed)?;
            ctx.index.apply_to(catalog.entry_mut(id));
        }
    }

    Ok(())
}

/// Ingest the DOWNLOAD manifest: encoded sizes, priorities, and the per-tag
/// bitmaps folded into each entry's bitmask.
fn load_download(
    ctx: &mut OpenContext,
    catalog: &mut Catalog,
    well_known: &WellKnownFiles,
    features: &mut CascFeatures,
) -> Result<Vec<TagInfo>> {
    let Some(ckey) = well_known.download.ckey else {
        return Ok(Vec::new());
    };
    let Some(id) = catalog.find_by_ckey(&ckey) else {
        return Ok(Vec::new());
    };

    let data = match ctx.load_internal_file(catalog, id) {
        Ok(data) => data,
        Err(CascError::FileNotFound) => {
            debug!("DOWNLOAD manifest not present; continuing without it");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let manifest = DownloadManifest::parse(&data)?;
    if manifest.header.tag_count > 0 {
        features.insert(CascFeatures::TAGS);
    }

    for (i, dl_entry) in manifest.entries.iter().enumerate() {
        let id = catalog.insert_or_merge(EntrySeed {
            ckey: None,
            ekey: Some(EKey(dl_entry.ekey)),
            content_size: None,
            encoded_size: Some(dl_entry.encoded_size.min(u64::from(u32::MAX)) as u32),
            flags: EntryFlags::HAS_EKEY | EntryFlags::IN_DOWNLOAD,
        })?;

        let entry = catalog.entry_mut(id);
        entry.priority = dl_entry.priority;
        for (j, tag) in manifest.tags.iter().enumerate().take(64) {
            if tag.is_set(i) {
                entry.tag_bitmask |= 1u64 << j;
            }
        }
        ctx.index.apply_to(catalog.entry_mut(id));
    }

    debug!(
        "DOWNLOAD contributed {} entries, {} tags",
        manifest.entries.len(),
        manifest.tags.len()
    );

    Ok(manifest
        .tags
        .into_iter()
        .map(|t| TagInfo {
            name: t.name,
            value: t.value,
        })
        .collect())
}

enum RootStageError {
    /// Kills the open outright.
    Fatal(CascError),
    /// The ROOT could not be used; the INSTALL fallback applies.
    Recoverable(CascError),
}

/// Load the ROOT manifest through the decoder chain; fall back to INSTALL
/// when it is missing or undecodable. Memory exhaustion and a second
/// reparse request stay fatal.
fn load_root_with_fallback(
    ctx: &mut OpenContext,
    catalog: &mut Catalog,
    well_known: &WellKnownFiles,
    factories: &[RootFactory],
    locale_mask: u32,
) -> Result<Box<dyn RootHandler>> {
    match load_root(ctx, catalog, well_known, factories, locale_mask) {
        Ok(root) => Ok(root),
        Err(RootStageError::Fatal(e)) => Err(e),
        Err(RootStageError::Recoverable(e)) => {
            warn!("ROOT manifest unusable ({e}); falling back to INSTALL");
            match load_install_fallback(ctx, catalog, well_known) {
                Ok(root) => Ok(root),
                // Neither ROOT nor INSTALL: the storage still opens, with
                // only the well-known names resolvable.
                Err(CascError::FileNotFound) => Ok(Box::new(FileTreeRoot::new())),
                Err(e) => Err(e),
            }
        }
    }
}

fn load_root(
    ctx: &mut OpenContext,
    catalog: &mut Catalog,
    well_known: &WellKnownFiles,
    factories: &[RootFactory],
    locale_mask: u32,
) -> std::result::Result<Box<dyn RootHandler>, RootStageError> {
    use RootStageError::{Fatal, Recoverable};

    // The VFS root takes precedence over the legacy ROOT file.
    let (mut target, mut on_legacy) = match (&well_known.vfs_root.ckey, &well_known.root.ckey) {
        (Some(vfs), _) => (*vfs, false),
        (None, Some(root)) => (*root, true),
        (None, None) => return Err(Recoverable(CascError::FileNotFound)),
    };

    let mut prior: Option<Box<dyn RootHandler>> = None;
    let mut reparsed = false;

    loop {
        let outcome = (|| -> Result<RootDispatch> {
            let id = catalog.find_by_ckey(&target).ok_or(CascError::FileNotFound)?;
            let data = ctx.load_internal_file(catalog, id)?;
            dispatch_root(factories, &data, locale_mask, catalog)
        })();

        let partial = match outcome {
            Ok(RootDispatch::Ready(mut handler)) => {
                if let Some(prior) = prior {
                    handler.copy_from(prior.as_ref());
                }
                return Ok(handler);
            }
            Ok(RootDispatch::Reparse(handler)) => handler,
            Ok(RootDispatch::Unrecognized) => {
                return Err(Recoverable(CascError::BadFormat));
            }
            Err(CascError::ReparseRoot) => Box::new(FileTreeRoot::new()) as Box<dyn RootHandler>,
            Err(e @ (CascError::CapacityExceeded | CascError::Cancelled)) => {
                return Err(Fatal(e));
            }
            Err(e) => return Err(Recoverable(e)),
        };

        // Reparse: switch to the legacy ROOT digest and retry exactly once,
        // keeping the partial handler's names for the retry's handler.
        if reparsed || on_legacy {
            return Err(Fatal(CascError::FileCorrupt));
        }
        ctx.poll("Loading ROOT manifest (reparsed)").map_err(Fatal)?;

        target = match well_known.root.ckey {
            Some(root) => root,
            None => return Err(Fatal(CascError::FileCorrupt)),
        };
        prior = Some(partial);
        reparsed = true;
        on_legacy = true;
    }
}

/// Probe the root bytes against every decoder in order.
fn dispatch_root(
    factories: &[RootFactory],
    data: &[u8],
    locale_mask: u32,
    catalog: &mut Catalog,
) -> Result<RootDispatch> {
    for factory in factories {
        match factory(data, locale_mask, catalog)? {
            RootDispatch::Unrecognized => continue,
            outcome => return Ok(outcome),
        }
    }
    Ok(RootDispatch::Unrecognized)
}

fn load_install_fallback(
    ctx: &mut OpenContext,
    catalog: &mut Catalog,
    well_known: &WellKnownFiles,
) -> Result<Box<dyn RootHandler>> {
    let ckey = well_known.install.ckey.ok_or(CascError::FileNotFound)?;
    let id = catalog.find_by_ckey(&ckey).ok_or(CascError::FileNotFound)?;

    let data = ctx.load_internal_file(catalog, id)?;
    let manifest = InstallManifest::parse(&data)?;
    let root = crate::root::install_root(&manifest, catalog)?;
    Ok(Box::new(root))
}

/// Insert the well-known names into the root handler, so the documents are
/// reachable through ordinary lookups. PATCH is special: it exists only
/// online and only by encoded key, so a missing entry is synthesized there.
fn insert_well_known_files(
    catalog: &mut Catalog,
    root: &mut dyn RootHandler,
    well_known: &WellKnownFiles,
    online: bool,
) -> Result<()> {
    let files: [(&str, &WellKnown, EntryFlags); 6] = [
        ("ENCODING", &well_known.encoding, EntryFlags::default()),
        ("DOWNLOAD", &well_known.download, EntryFlags::default()),
        ("INSTALL", &well_known.install, EntryFlags::default()),
        ("PATCH", &well_known.patch, EntryFlags::FILE_PATCH),
        ("ROOT", &well_known.root, EntryFlags::default()),
        ("SIZE", &well_known.size, EntryFlags::default()),
    ];

    for (name, wk, extra) in files {
        let found = wk
            .ckey
            .and_then(|ckey| catalog.find_by_ckey(&ckey))
            .or_else(|| wk.ekey.and_then(|ekey| catalog.find_by_ekey(&ekey.prefix())));

        let id = match found {
            Some(id) => id,
            None if online && extra.contains(EntryFlags::FILE_PATCH) && wk.ekey.is_some() => {
                catalog.insert_or_merge(EntrySeed {
                    ckey: None,
                    ekey: wk.ekey,
                    content_size: wk.content_size,
                    encoded_size: None,
                    flags: EntryFlags::HAS_EKEY | EntryFlags::IN_BUILD | EntryFlags::FILE_PATCH,
                })?
            }
            None => continue,
        };

        root.insert(name, id);
        let entry = catalog.entry_mut(id);
        entry.flags.insert(extra | EntryFlags::IN_BUILD);
        entry.ref_count += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_full_form() {
        let mut args = OpenArgs::default();
        apply_params("/cache*http://cdn.example:8000*wowt*us", &mut args).unwrap();
        assert_eq!(args.local_path.as_deref(), Some(std::path::Path::new("/cache")));
        assert_eq!(args.cdn_host_url.as_deref(), Some("http://cdn.example:8000"));
        assert_eq!(args.code_name.as_deref(), Some("wowt"));
        assert_eq!(args.region.as_deref(), Some("us"));
    }

    #[test]
    fn test_params_url_slot_is_optional() {
        let mut args = OpenArgs::default();
        apply_params("/cache*wowt*eu", &mut args).unwrap();
        assert_eq!(args.cdn_host_url, None);
        assert_eq!(args.code_name.as_deref(), Some("wowt"));
        assert_eq!(args.region.as_deref(), Some("eu"));
    }

    #[test]
    fn test_params_local_only() {
        let mut args = OpenArgs::default();
        apply_params("/games/storage", &mut args).unwrap();
        assert_eq!(
            args.local_path.as_deref(),
            Some(std::path::Path::new("/games/storage"))
        );
        assert_eq!(args.code_name, None);
    }

    #[test]
    fn test_params_conflict_with_args() {
        let mut args = OpenArgs {
            code_name: Some("wow".into()),
            ..Default::default()
        };
        assert!(matches!(
            apply_params("/cache*wowt", &mut args),
            Err(CascError::InvalidParameter)
        ));

        let mut args = OpenArgs {
            local_path: Some("/elsewhere".into()),
            ..Default::default()
        };
        assert!(matches!(
            apply_params("/cache", &mut args),
            Err(CascError::InvalidParameter)
        ));
    }

    #[test]
    fn test_params_empty_is_invalid() {
        let mut args = OpenArgs::default();
        assert!(matches!(
            apply_params("", &mut args),
            Err(CascError::InvalidParameter)
        ));
    }

    #[test]
    fn test_url_predicate() {
        assert!(is_url("http://host"));
        assert!(is_url("cdn.example"));
        assert!(is_url("host/path"));
        assert!(!is_url("wowt"));
    }
}
