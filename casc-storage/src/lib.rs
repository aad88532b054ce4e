//! Read-only CASC storage assembly engine.
//!
//! Opens a local storage directory (or a CDN-backed cache), reconciles the
//! build descriptor, CDN configuration, local index and the ENCODING /
//! DOWNLOAD manifests into one searchable catalog, and hands back a sealed,
//! concurrently readable storage handle.
//!
//! ```no_run
//! use casc_storage::{open_storage, OpenArgs};
//!
//! let storage = open_storage(Some("/games/wow"), OpenArgs::default())?;
//! println!("{} files", storage.total_file_count());
//! # Ok::<(), casc_storage::CascError>(())
//! ```

pub mod blockio;
pub mod catalog;
pub mod descriptor;
mod error;
pub mod index;
mod open;
pub mod root;
pub mod sockets;
pub mod storage;
pub mod types;

pub use error::{CascError, Result};
pub use open::{open_storage, OpenArgs, ProgressCallback};
pub use storage::Storage;
pub use types::{ArchiveLocation, CKey, CascFeatures, EKey, EntryFlags, Product, TagInfo};

pub use catalog::{Catalog, CatalogEntry, EntryId, EntrySeed};
pub use root::{FileTreeRoot, RootDispatch, RootFactory, RootHandler};
