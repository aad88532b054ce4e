//! Process-wide connection cache lifecycle.
//!
//! Online storages share persistent CDN connections. Caching turns on with
//! the first online handle and off when the last one is released; a
//! CDN-backed [`crate::blockio::BlockReader`] consults
//! [`caching_enabled`] to decide whether to pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

static ONLINE_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// Whether persistent connections should currently be cached.
pub fn caching_enabled() -> bool {
    ONLINE_HANDLES.load(Ordering::Acquire) > 0
}

/// RAII guard tying the cache to the lifetime of one online storage handle.
pub(crate) struct SocketCacheGuard(());

impl SocketCacheGuard {
    pub(crate) fn acquire() -> Self {
        if ONLINE_HANDLES.fetch_add(1, Ordering::AcqRel) == 0 {
            debug!("First online storage handle; enabling connection caching");
        }
        SocketCacheGuard(())
    }
}

impl Drop for SocketCacheGuard {
    fn drop(&mut self) {
        if ONLINE_HANDLES.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("Last online storage handle released; disabling connection caching");
        }
    }
}
