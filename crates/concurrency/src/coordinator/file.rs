//! Lock files in a shared directory
//!
//! A lock is a file created with `create_new`, holding the owner's member id.
//! Heartbeats touch the files a member holds, refreshing their mtime; a file
//! older than the TTL belongs to a dead member and may be stolen.
//!
//! Stealing happens under a `<key>.steal` guard file, itself taken with
//! `create_new`. The stealer re-checks staleness while holding the guard, so
//! two members that both saw the same stale file cannot both replace it.
//! Heartbeats never create or rewrite a lock file, only its mtime.

use super::{member_id, Coordinator};
use parking_lot::Mutex;
use rowbench_core::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File-based coordinator member
#[derive(Debug)]
pub struct FileCoordinator {
    dir: PathBuf,
    member: String,
    ttl: Duration,
    held: Mutex<HashSet<String>>,
}

impl FileCoordinator {
    /// Join the lock directory `dir`, creating it if needed
    pub fn open(dir: impl AsRef<Path>, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            member: member_id(),
            ttl,
            held: Mutex::new(HashSet::new()),
        })
    }

    /// Lock file path for `key`
    pub fn lock_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.lock", name))
    }

    fn try_create(&self, path: &Path) -> Result<bool> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(self.member.as_bytes())?;
                file.sync_all()?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn owner(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(owner) => Ok(Some(owner)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn is_stale(&self, path: &Path) -> Result<bool> {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(modified.elapsed().map(|age| age > self.ttl).unwrap_or(false))
    }

    /// Replace a stale lock file at `path`, one stealer at a time
    fn steal(&self, key: &str, path: &Path) -> Result<bool> {
        let guard = path.with_extension("steal");
        if !self.try_create(&guard)? {
            // A stealer that died mid-steal leaves its guard behind.
            if self.is_stale(&guard)? {
                tracing::warn!(key, path = %guard.display(), "removing abandoned steal guard");
                remove_if_exists(&guard)?;
            }
            return Ok(false);
        }

        let stolen = self.steal_guarded(key, path);
        if let Err(e) = remove_if_exists(&guard) {
            tracing::error!(key, path = %guard.display(), error = %e, "could not remove steal guard");
        }
        stolen
    }

    fn steal_guarded(&self, key: &str, path: &Path) -> Result<bool> {
        // Another stealer may have replaced the file since our first check.
        if !self.is_stale(path)? {
            return Ok(false);
        }
        tracing::warn!(key, path = %path.display(), "stealing stale lock file");
        remove_if_exists(path)?;
        self.try_create(path)
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Refresh the mtime of an existing file, failing if it is gone
fn touch(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

impl Coordinator for FileCoordinator {
    fn member_id(&self) -> &str {
        &self.member
    }

    fn acquire(&self, key: &str) -> Result<bool> {
        let path = self.lock_path(key);
        if self.try_create(&path)? {
            self.held.lock().insert(key.to_string());
            return Ok(true);
        }
        if !self.is_stale(&path)? {
            return Ok(false);
        }

        if self.steal(key, &path)? {
            self.held.lock().insert(key.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn release(&self, key: &str) -> Result<()> {
        let path = self.lock_path(key);
        let was_held = self.held.lock().remove(key);
        match Self::owner(&path)? {
            Some(owner) if owner == self.member && was_held => {
                fs::remove_file(&path)?;
                Ok(())
            }
            _ => Err(Error::Coordinator(format!(
                "lock {} is not held by member {}",
                key, self.member
            ))),
        }
    }

    fn heartbeat(&self) -> Result<()> {
        let held: Vec<String> = self.held.lock().iter().cloned().collect();
        for key in held {
            let path = self.lock_path(&key);
            match Self::owner(&path)? {
                Some(owner) if owner == self.member => match touch(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        self.held.lock().remove(&key);
                        return Err(Error::Coordinator(format!("lock {} was lost", key)));
                    }
                    Err(e) => return Err(e.into()),
                },
                _ => {
                    self.held.lock().remove(&key);
                    return Err(Error::Coordinator(format!("lock {} was lost", key)));
                }
            }
        }
        Ok(())
    }
}
