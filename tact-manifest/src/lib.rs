//! Parsers for the TACT side of a CASC storage: build descriptors
//! (`.build.info`, `.build.db`, `versions`), the key-value CDN configuration
//! documents, and the binary ENCODING / DOWNLOAD / INSTALL manifests.
//!
//! Everything in this crate parses byte slices or [`std::io::BufRead`]
//! streams; locating and fetching the documents belongs to the storage layer.
//!
//! IMPORTANT: the binary manifests use BIG-ENDIAN byte order, unlike most
//! other CASC formats.

pub mod bpsv;
pub mod build_file;
pub mod config;
pub mod download;
pub mod encoding;
mod error;
pub mod install;
mod ioutils;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Length of an MD5 digest in bytes.
pub const MD5_LENGTH: usize = 16;

/// Length of a base16-encoded MD5 digest.
pub const MD5_HEX_LENGTH: usize = MD5_LENGTH * 2;

/// A raw 16-byte digest as it appears in configuration documents.
pub type Md5 = [u8; MD5_LENGTH];

/// One or two values of the same type.
///
/// Configuration documents give well-known files either as a single content
/// digest or as a `ckey ekey` pair; sizes follow the same convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaybePair<T> {
    Solo(T),
    Pair(T, T),
}

impl<T: Copy> MaybePair<T> {
    /// The first (content-side) value.
    pub fn first(&self) -> T {
        match self {
            MaybePair::Solo(a) => *a,
            MaybePair::Pair(a, _) => *a,
        }
    }

    /// The second (encoded-side) value, if the document carried one.
    pub fn second(&self) -> Option<T> {
        match self {
            MaybePair::Solo(_) => None,
            MaybePair::Pair(_, b) => Some(*b),
        }
    }
}

impl<T> From<(T, T)> for MaybePair<T> {
    fn from((a, b): (T, T)) -> Self {
        MaybePair::Pair(a, b)
    }
}
