//! Error surface of the storage engine.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("A required file or descriptor could not be located")]
    FileNotFound,

    #[error("Unrecognized header magic, version, or key length")]
    BadFormat,

    #[error("Storage content failed an internal consistency check")]
    FileCorrupt,

    #[error("Catalog capacity exhausted; the file count estimate undercounted")]
    CapacityExceeded,

    #[error("Invalid or conflicting parameter")]
    InvalidParameter,

    #[error("Open was cancelled by the progress callback")]
    Cancelled,

    #[error("The storage does not support the requested operation")]
    NotSupported,

    /// Internal only: a root decoder identified a different root document.
    /// Never escapes [`crate::open_storage`].
    #[error("Root decoder requested a reparse")]
    ReparseRoot,
}

impl From<tact_manifest::Error> for CascError {
    fn from(e: tact_manifest::Error) -> Self {
        use tact_manifest::Error as E;
        match e {
            E::IOError(inner) if inner.kind() == io::ErrorKind::NotFound => {
                CascError::FileNotFound
            }
            E::IOError(inner) => CascError::Io(inner),
            E::BadMagic
            | E::BadFormat
            | E::ConfigSyntax
            | E::ConfigTypeMismatch
            | E::DescriptorSyntax => CascError::BadFormat,
            E::Truncated | E::PageFirstKeyMismatch | E::ChecksumMismatch => CascError::FileCorrupt,
            E::BuildRowNotFound => CascError::FileNotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, CascError>;
