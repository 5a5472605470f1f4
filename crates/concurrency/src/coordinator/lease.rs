//! Lease lifecycle on top of a coordinator connection
//!
//! ## Lease Sequence
//!
//! ```text
//! 1. lock(key)       - acquire(key); on false: heartbeat(), sleep, try again
//! 2. Lease returned  - exclusive until released
//! 3. background      - heartbeat() every interval while the manager lives
//! 4. release()       - explicit, or by Drop on any other exit path
//! ```
//!
//! A lease is released at most once: `release` consumes the guard and
//! disarms its Drop. A heartbeat failure is never swallowed; it is recorded
//! and surfaced as `Error::Coordinator` by the next `lock` or `check`.

use super::Coordinator;
use parking_lot::Mutex;
use rowbench_core::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lease timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Delay between acquisition attempts while the lock is taken
    pub retry_delay: Duration,
    /// Interval of the background heartbeat; zero disables the thread
    pub heartbeat_interval: Duration,
    /// Give up waiting for a lease after this long; `None` waits forever
    pub acquire_timeout: Option<Duration>,
}

impl LeaseConfig {
    /// Set the acquisition retry delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Bound the time spent waiting for a lease
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(10),
            heartbeat_interval: Duration::from_secs(1),
            acquire_timeout: None,
        }
    }
}

/// Lease counters of one manager
#[derive(Debug, Default)]
pub struct LeaseStats {
    acquired: AtomicU64,
    released: AtomicU64,
    release_failures: AtomicU64,
    heartbeats: AtomicU64,
}

impl LeaseStats {
    /// Leases granted
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Acquire)
    }

    /// Leases released successfully
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    /// Release calls that returned an error
    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Acquire)
    }

    /// Successful background heartbeats
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Acquire)
    }

    /// Leases granted and not released yet
    pub fn outstanding(&self) -> u64 {
        self.acquired()
            .saturating_sub(self.released() + self.release_failures())
    }
}

struct Heartbeat {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Hands out leases from one coordinator connection
///
/// One manager per strategy instance; it owns the member connection and
/// its heartbeat thread, both torn down on drop.
///
/// # Thread Safety
///
/// The heartbeat thread shares the coordinator with the owning worker.
/// Failures it observes are parked in a shared slot instead of being
/// dropped.
pub struct LeaseManager {
    /// Member connection
    coordinator: Arc<dyn Coordinator>,

    /// Timing
    config: LeaseConfig,

    /// Counters shared with every lease guard
    stats: Arc<LeaseStats>,

    /// Last heartbeat failure not yet reported
    failure: Arc<Mutex<Option<String>>>,

    /// Background heartbeat, `None` when disabled
    heartbeat: Option<Heartbeat>,
}

impl LeaseManager {
    /// Create a manager and start its heartbeat thread
    ///
    /// # Arguments
    /// * `coordinator` - member connection, used only through this manager
    /// * `config` - lease timing
    pub fn new(coordinator: Arc<dyn Coordinator>, config: LeaseConfig) -> Result<Self> {
        let stats = Arc::new(LeaseStats::default());
        let failure = Arc::new(Mutex::new(None));

        let heartbeat = if config.heartbeat_interval.is_zero() {
            None
        } else {
            Some(Self::spawn_heartbeat(
                Arc::clone(&coordinator),
                config.heartbeat_interval,
                Arc::clone(&stats),
                Arc::clone(&failure),
            )?)
        };

        Ok(Self {
            coordinator,
            config,
            stats,
            failure,
            heartbeat,
        })
    }

    fn spawn_heartbeat(
        coordinator: Arc<dyn Coordinator>,
        interval: Duration,
        stats: Arc<LeaseStats>,
        failure: Arc<Mutex<Option<String>>>,
    ) -> Result<Heartbeat> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("lease-heartbeat-{}", coordinator.member_id()))
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match coordinator.heartbeat() {
                        Ok(()) => {
                            stats.heartbeats.fetch_add(1, Ordering::AcqRel);
                        }
                        Err(e) => {
                            tracing::warn!(member = coordinator.member_id(), error = %e, "heartbeat failed");
                            *failure.lock() = Some(e.to_string());
                        }
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Heartbeat { stop, handle })
    }

    /// Member connection
    pub fn coordinator(&self) -> &Arc<dyn Coordinator> {
        &self.coordinator
    }

    /// Lease counters
    pub fn stats(&self) -> &LeaseStats {
        &self.stats
    }

    /// Report a heartbeat failure recorded since the last check
    pub fn check(&self) -> Result<()> {
        match self.failure.lock().take() {
            Some(msg) => Err(Error::Coordinator(format!("heartbeat failed: {}", msg))),
            None => Ok(()),
        }
    }

    /// Block until the lock named `key` is held
    ///
    /// Heartbeats between attempts so the member stays alive while it waits.
    pub fn lock(&self, key: &str) -> Result<Lease> {
        let started = Instant::now();
        let mut attempts = 0u64;
        loop {
            self.check()?;
            attempts += 1;
            if self.coordinator.acquire(key)? {
                self.stats.acquired.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(key, attempts, "lease acquired");
                return Ok(Lease {
                    key: key.to_string(),
                    coordinator: Arc::clone(&self.coordinator),
                    stats: Arc::clone(&self.stats),
                    released: false,
                });
            }

            self.coordinator.heartbeat()?;

            if let Some(timeout) = self.config.acquire_timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::Coordinator(format!(
                        "timed out after {:?} waiting for lease {}",
                        timeout, key
                    )));
                }
            }
            thread::sleep(self.config.retry_delay);
        }
    }
}

impl Drop for LeaseManager {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            let _ = heartbeat.stop.send(());
            if heartbeat.handle.join().is_err() {
                tracing::warn!("heartbeat thread panicked");
            }
        }
    }
}

impl fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseManager")
            .field("member", &self.coordinator.member_id())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Exclusive claim on one named lock
///
/// Released by [`Lease::release`] or, failing that, on drop.
#[must_use = "a lease is released as soon as it is dropped"]
pub struct Lease {
    key: String,
    coordinator: Arc<dyn Coordinator>,
    stats: Arc<LeaseStats>,
    released: bool,
}

impl Lease {
    /// Name of the lock
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lease, reporting failures
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.release_inner()
    }

    fn release_inner(&self) -> Result<()> {
        match self.coordinator.release(&self.key) {
            Ok(()) => {
                self.stats.released.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(key = %self.key, "lease released");
                Ok(())
            }
            Err(e) => {
                self.stats.release_failures.fetch_add(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.release_inner() {
            tracing::warn!(key = %self.key, error = %e, "failed to release lease on drop");
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("member", &self.coordinator.member_id())
            .field("released", &self.released)
            .finish()
    }
}
