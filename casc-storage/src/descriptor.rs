//! Locating the top-level build descriptor.
//!
//! A storage directory is recognized by one of three descriptor files,
//! probed in precedence order: `.build.info`, `.build.db`, `versions`.
//! Callers often hand us a subdirectory of the installation (the game
//! binary's directory), so the probe walks parent directories too.

use std::path::{Path, PathBuf};

use tact_manifest::build_file::BuildDescriptorKind;
use tracing::debug;

use crate::error::{CascError, Result};

/// Descriptor file names in precedence order.
const DESCRIPTOR_NAMES: [(&str, BuildDescriptorKind); 3] = [
    (".build.info", BuildDescriptorKind::BuildInfo),
    (".build.db", BuildDescriptorKind::BuildDb),
    ("versions", BuildDescriptorKind::Versions),
];

/// A located build descriptor.
#[derive(Debug, Clone)]
pub struct LocatedDescriptor {
    pub path: PathBuf,
    pub kind: BuildDescriptorKind,
    /// The storage root: the directory holding the descriptor.
    pub root: PathBuf,
}

/// Probe `dir` and its ancestors for a build descriptor.
pub fn locate_build_file(dir: &Path) -> Result<LocatedDescriptor> {
    let mut current = Some(dir);

    while let Some(dir) = current {
        for (name, kind) in DESCRIPTOR_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                debug!("Found build descriptor {path:?}");
                return Ok(LocatedDescriptor {
                    path,
                    kind,
                    root: dir.to_path_buf(),
                });
            }
        }
        current = dir.parent();
    }

    Err(CascError::FileNotFound)
}

/// The data directory of a storage root, holding archives and index files.
/// Either capitalization occurs in the wild.
pub fn data_directory(root: &Path) -> Option<PathBuf> {
    for candidate in ["Data/data", "data/data"] {
        let path = root.join(candidate);
        if path.is_dir() {
            return Some(path);
        }
    }
    None
}

/// Local cache path of a config document: `<root>/Data/config/ab/cd/<hex>`,
/// fanned out by the first two key bytes.
pub fn config_path(root: &Path, key: &[u8; 16]) -> PathBuf {
    let hex = hex::encode(key);
    for base in ["Data/config", "data/config"] {
        let path = root
            .join(base)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex);
        if path.is_file() {
            return path;
        }
    }
    root.join("Data/config")
        .join(&hex[0..2])
        .join(&hex[2..4])
        .join(hex)
}
