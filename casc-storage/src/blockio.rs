//! Seams to the block device, frame codec, and key store collaborators.
//!
//! The assembly pipeline only ever needs whole blobs: the manifests it
//! ingests and the config documents it resolves. Range reads, HTTP
//! transport, and the frame-level decrypt/decompress live behind these
//! traits.

use crate::catalog::Catalog;
use crate::error::{CascError, Result};
use crate::types::ArchiveLocation;

/// Which CDN namespace a remote key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// Config documents, addressed by their own MD5.
    Config,
    /// Data blobs, addressed by EKey.
    Data,
    /// Patch blobs, addressed by EKey.
    Patch,
}

/// Raw blob access, local or remote.
pub trait BlockReader: Send + Sync {
    /// Read an encoded blob out of the local data archives.
    fn read_local(&self, location: &ArchiveLocation) -> Result<Vec<u8>>;

    /// Fetch a blob from the CDN by its key.
    fn read_remote(&self, kind: RemoteKind, key: &[u8; 16]) -> Result<Vec<u8>>;

    /// Fetch the build descriptor for a product. Only needed when the
    /// storage directory has no descriptor and the caller asked for online
    /// mode.
    fn fetch_descriptor(&self, _code_name: &str) -> Result<Vec<u8>> {
        Err(CascError::NotSupported)
    }
}

/// Decodes a frame-encoded blob into file bytes.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through decoder for storages whose manifests are stored raw, and
/// for fixtures. Real storages supply the frame codec here.
pub struct IdentityDecoder;

impl FrameDecoder for IdentityDecoder {
    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        Ok(encoded.to_vec())
    }
}

/// Encryption-key provisioning, consulted once the catalog is assembled.
pub trait KeyStore: Send + Sync {
    fn load_keys(&self, catalog: &Catalog) -> Result<()>;
}

/// Key store for storages without encrypted content.
pub struct NullKeyStore;

impl KeyStore for NullKeyStore {
    fn load_keys(&self, _catalog: &Catalog) -> Result<()> {
        Ok(())
    }
}
