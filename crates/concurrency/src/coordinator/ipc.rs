//! Host-local lock registry
//!
//! Stands in for named semaphores shared between processes on one host.
//! There is no TTL: a lock lives as long as its member, and dropping the
//! member frees everything it held, the way process exit frees its
//! semaphores.

use super::{member_id, Coordinator};
use parking_lot::Mutex;
use rowbench_core::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared registry of lock owners
#[derive(Clone, Default)]
pub struct IpcHub {
    owners: Arc<Mutex<HashMap<String, String>>>,
}

impl IpcHub {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner of `key`
    pub fn owner(&self, key: &str) -> Option<String> {
        self.owners.lock().get(key).cloned()
    }

    /// Number of locks held
    pub fn held(&self) -> usize {
        self.owners.lock().len()
    }
}

impl fmt::Debug for IpcHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcHub").field("held", &self.held()).finish()
    }
}

/// Member of an [`IpcHub`]
#[derive(Debug)]
pub struct IpcCoordinator {
    hub: IpcHub,
    member: String,
}

impl IpcCoordinator {
    /// Join `hub` as a new member
    pub fn new(hub: IpcHub) -> Self {
        Self {
            hub,
            member: member_id(),
        }
    }
}

impl Coordinator for IpcCoordinator {
    fn member_id(&self) -> &str {
        &self.member
    }

    fn acquire(&self, key: &str) -> Result<bool> {
        let mut owners = self.hub.owners.lock();
        if owners.contains_key(key) {
            return Ok(false);
        }
        owners.insert(key.to_string(), self.member.clone());
        Ok(true)
    }

    fn release(&self, key: &str) -> Result<()> {
        let mut owners = self.hub.owners.lock();
        let owned = owners.get(key).map_or(false, |owner| *owner == self.member);
        if !owned {
            return Err(Error::Coordinator(format!(
                "lock {} is not held by member {}",
                key, self.member
            )));
        }
        owners.remove(key);
        Ok(())
    }

    fn heartbeat(&self) -> Result<()> {
        Ok(())
    }
}

impl Drop for IpcCoordinator {
    fn drop(&mut self) {
        self.hub.owners.lock().retain(|_, owner| *owner != self.member);
    }
}
