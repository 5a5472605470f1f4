//! Networked key-value coordination
//!
//! A lock is a key set-if-absent with a TTL and the member id as value.
//! Heartbeats refresh the TTL of held keys with a compare-and-expire;
//! release is a compare-and-delete, so a member never removes a key that
//! expired and was taken by someone else.

use super::{member_id, Coordinator};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rowbench_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client surface of a key-value service with expiring keys
pub trait KvStore: Send + Sync {
    /// Set `key` to `value` with a TTL unless a live value exists
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Reset the TTL of `key` if it still holds `value`
    fn expire_if_equal(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` if it still holds `value`
    fn delete_if_equal(&self, key: &str, value: &str) -> Result<bool>;
}

/// In-process key-value service
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryKv {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Live value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|e| e.value().1 > Instant::now())
            .map(|e| e.value().0.clone())
    }
}

impl KvStore for MemoryKv {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().1 > now {
                    return Ok(false);
                }
                e.insert((value.to_string(), now + ttl));
                Ok(true)
            }
            Entry::Vacant(e) => {
                e.insert((value.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    fn expire_if_equal(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut e) if e.0 == value && e.1 > now => {
                e.1 = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_if_equal(&self, key: &str, value: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, (owner, expires)| owner == value && *expires > now)
            .is_some())
    }
}

/// Key-value coordinator member
pub struct KvCoordinator {
    store: Arc<dyn KvStore>,
    member: String,
    ttl: Duration,
    held: Mutex<HashSet<String>>,
}

impl KvCoordinator {
    /// Key prefix of every lock
    pub const PREFIX: &'static str = "rowbench/lock/";

    /// Join the service behind `store`
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store,
            member: member_id(),
            ttl,
            held: Mutex::new(HashSet::new()),
        }
    }

    fn store_key(key: &str) -> String {
        format!("{}{}", Self::PREFIX, key)
    }
}

impl Coordinator for KvCoordinator {
    fn member_id(&self) -> &str {
        &self.member
    }

    fn acquire(&self, key: &str) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(&Self::store_key(key), &self.member, self.ttl)?;
        if acquired {
            self.held.lock().insert(key.to_string());
        }
        Ok(acquired)
    }

    fn release(&self, key: &str) -> Result<()> {
        self.held.lock().remove(key);
        if self.store.delete_if_equal(&Self::store_key(key), &self.member)? {
            Ok(())
        } else {
            Err(Error::Coordinator(format!(
                "lock {} expired or is held by another member",
                key
            )))
        }
    }

    fn heartbeat(&self) -> Result<()> {
        let held: Vec<String> = self.held.lock().iter().cloned().collect();
        for key in held {
            if !self
                .store
                .expire_if_equal(&Self::store_key(&key), &self.member, self.ttl)?
            {
                self.held.lock().remove(&key);
                return Err(Error::Coordinator(format!("lock {} was lost", key)));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for KvCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvCoordinator")
            .field("member", &self.member)
            .field("ttl", &self.ttl)
            .field("held", &self.held.lock().len())
            .finish()
    }
}
