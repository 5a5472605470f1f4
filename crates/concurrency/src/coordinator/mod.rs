//! Distributed lock coordination
//!
//! A [`Coordinator`] is one member's connection to an external
//! mutual-exclusion service: `acquire(key) -> bool` (non-blocking),
//! `release(key)` and `heartbeat()`. [`LeaseManager`] builds the blocking,
//! heartbeated, release-on-every-path [`Lease`] on top of it.
//!
//! ## Backends
//!
//! | Backend | Type | Liveness |
//! |---------|------|----------|
//! | local file | [`FileCoordinator`] | lock file mtime, stale files are stolen after the TTL |
//! | local IPC | [`IpcCoordinator`] | member lifetime, locks freed when the member goes away |
//! | networked key-value | [`KvCoordinator`] | keys with a TTL refreshed by heartbeats |
//!
//! [`CoordinatorService`] is the configuration-level handle: it names a
//! backend and hands out one fresh member connection per strategy instance.

mod file;
mod ipc;
mod kv;
mod lease;

pub use file::FileCoordinator;
pub use ipc::{IpcCoordinator, IpcHub};
pub use kv::{KvCoordinator, KvStore, MemoryKv};
pub use lease::{Lease, LeaseConfig, LeaseManager, LeaseStats};

use rowbench_core::Result;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One member's connection to a coordination service
///
/// Implementations must be safe to call from the heartbeat thread while a
/// worker thread acquires or releases.
pub trait Coordinator: Send + Sync {
    /// Unique id of this member
    fn member_id(&self) -> &str;

    /// Try to take the lock named `key`; `false` if another member holds it
    fn acquire(&self, key: &str) -> Result<bool>;

    /// Release a lock held by this member
    ///
    /// Releasing a lock this member no longer holds (expired, stolen) is an
    /// error: the exclusivity it was supposed to guarantee is gone.
    fn release(&self, key: &str) -> Result<()>;

    /// Keep the member and every lock it holds alive
    fn heartbeat(&self) -> Result<()>;
}

/// Configured coordination service, able to open member connections
#[derive(Clone)]
pub enum CoordinatorService {
    /// Lock files in a shared directory
    File {
        /// Directory holding the lock files
        dir: PathBuf,
        /// Age after which a lock file whose owner stopped heartbeating is stolen
        ttl: Duration,
    },
    /// Host-local lock registry
    Ipc(IpcHub),
    /// Key-value service with expiring keys
    Kv {
        /// Service client
        store: Arc<dyn KvStore>,
        /// Key time-to-live, refreshed by heartbeats
        ttl: Duration,
    },
}

impl CoordinatorService {
    /// Lock-file backend rooted at `dir`
    pub fn file(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        CoordinatorService::File {
            dir: dir.into(),
            ttl,
        }
    }

    /// Fresh host-local registry
    pub fn ipc() -> Self {
        CoordinatorService::Ipc(IpcHub::new())
    }

    /// Key-value backend over `store`
    pub fn kv(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        CoordinatorService::Kv { store, ttl }
    }

    /// In-process key-value service
    pub fn memory_kv(ttl: Duration) -> Self {
        Self::kv(Arc::new(MemoryKv::new()), ttl)
    }

    /// Backend name
    pub fn backend(&self) -> &'static str {
        match self {
            CoordinatorService::File { .. } => "file",
            CoordinatorService::Ipc(_) => "ipc",
            CoordinatorService::Kv { .. } => "kv",
        }
    }

    /// Open a new member connection
    pub fn connect(&self) -> Result<Arc<dyn Coordinator>> {
        Ok(match self {
            CoordinatorService::File { dir, ttl } => Arc::new(FileCoordinator::open(dir, *ttl)?),
            CoordinatorService::Ipc(hub) => Arc::new(IpcCoordinator::new(hub.clone())),
            CoordinatorService::Kv { store, ttl } => {
                Arc::new(KvCoordinator::new(Arc::clone(store), *ttl))
            }
        })
    }
}

impl fmt::Debug for CoordinatorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorService::File { dir, ttl } => f
                .debug_struct("File")
                .field("dir", dir)
                .field("ttl", ttl)
                .finish(),
            CoordinatorService::Ipc(hub) => f.debug_tuple("Ipc").field(hub).finish(),
            CoordinatorService::Kv { ttl, .. } => f.debug_struct("Kv").field("ttl", ttl).finish(),
        }
    }
}

/// New member id
pub(crate) fn member_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusive(service: CoordinatorService) {
        let a = service.connect().unwrap();
        let b = service.connect().unwrap();
        assert_ne!(a.member_id(), b.member_id());

        assert!(a.acquire("record-1").unwrap());
        assert!(!b.acquire("record-1").unwrap());
        assert!(b.acquire("record-2").unwrap());

        a.release("record-1").unwrap();
        assert!(b.acquire("record-1").unwrap());
        assert!(b.release("record-2").is_ok());
        assert!(a.release("record-1").is_err());
        a.heartbeat().unwrap();
        b.heartbeat().unwrap();
    }

    #[test]
    fn test_file_backend_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        exclusive(CoordinatorService::file(dir.path(), Duration::from_secs(30)));
    }

    #[test]
    fn test_ipc_backend_exclusive() {
        exclusive(CoordinatorService::ipc());
    }

    #[test]
    fn test_kv_backend_exclusive() {
        exclusive(CoordinatorService::memory_kv(Duration::from_secs(30)));
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(CoordinatorService::ipc().backend(), "ipc");
        assert_eq!(CoordinatorService::memory_kv(Duration::from_secs(1)).backend(), "kv");
        assert_eq!(CoordinatorService::file("/tmp/x", Duration::from_secs(1)).backend(), "file");
    }
}
