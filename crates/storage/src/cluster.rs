//! In-memory multi-master cluster
//!
//! # Design
//!
//! - Committed state: one authoritative `DashMap` holding the latest committed
//!   image of every row, with a global commit version. Row locks serialize
//!   writers of the same row, so the authoritative image is always the result
//!   of a total order of commits.
//! - Replica views: every node has a [`ReplicaView`]. The node a commit
//!   originates from sees it at once; every other node sees it after the
//!   propagation delay (fixed part plus random jitter).
//! - Locking reads and conditional updates run against the authoritative
//!   state, plain reads against the node's own view. That is the visibility
//!   contract of a synchronous-certification multi-master cluster: writes are
//!   globally ordered, reads can be stale.
//!
//! # Thread Safety
//!
//! `Cluster` is a cheap `Arc` handle. Sessions opened from it may be moved
//! to other threads; a single session is never shared.

use crate::faults::FaultInjector;
use crate::locks::LockTable;
use crate::replica::{ReplicaView, Versioned};
use crate::session::ClusterSession;
use dashmap::DashMap;
use rand::Rng;
use rowbench_core::{
    status, Connector, Error, Record, RecordId, ReplicaId, Result, Session,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shape and timing of a simulated cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of replicas (nodes)
    pub replicas: usize,
    /// Fixed replication delay to other nodes, in milliseconds
    pub propagation_delay_ms: u64,
    /// Extra random delay added per commit and node, in milliseconds
    pub propagation_jitter_ms: u64,
    /// Maximum time a statement waits for a row lock, in milliseconds
    pub lock_wait_timeout_ms: u64,
}

impl ClusterConfig {
    /// Upper bound for every delay and timeout, in milliseconds (one day)
    pub const MAX_DELAY_MS: u64 = 86_400_000;

    /// Default configuration: 3 nodes, 20ms replication, 50s lock wait
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject shapes and timings the simulation cannot run
    pub fn validate(&self) -> Result<()> {
        if self.replicas == 0 {
            return Err(Error::InvalidConfig("cluster needs at least one replica".into()));
        }
        let timings = [
            ("propagation_delay_ms", self.propagation_delay_ms),
            ("propagation_jitter_ms", self.propagation_jitter_ms),
            ("lock_wait_timeout_ms", self.lock_wait_timeout_ms),
        ];
        for (name, value) in timings {
            if value > Self::MAX_DELAY_MS {
                return Err(Error::InvalidConfig(format!(
                    "cluster.{} ({}) exceeds {} ms",
                    name,
                    value,
                    Self::MAX_DELAY_MS
                )));
            }
        }
        Ok(())
    }

    /// Set the number of replicas
    pub fn replicas(mut self, n: usize) -> Self {
        self.replicas = n;
        self
    }

    /// Set the fixed propagation delay
    pub fn propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay_ms = millis(delay);
        self
    }

    /// Set the propagation jitter
    pub fn propagation_jitter(mut self, jitter: Duration) -> Self {
        self.propagation_jitter_ms = millis(jitter);
        self
    }

    /// Set the lock wait timeout
    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = millis(timeout);
        self
    }

    /// Lock wait timeout as a `Duration`
    pub fn lock_wait_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            replicas: 3,
            propagation_delay_ms: 20,
            propagation_jitter_ms: 10,
            lock_wait_timeout_ms: 50_000,
        }
    }
}

pub(crate) struct ClusterInner {
    pub(crate) config: ClusterConfig,
    pub(crate) committed: DashMap<RecordId, Versioned>,
    pub(crate) replicas: Vec<ReplicaView>,
    pub(crate) locks: LockTable,
    pub(crate) faults: FaultInjector,
    version: AtomicU64,
    next_session: AtomicU64,
    next_replica: AtomicUsize,
}

impl ClusterInner {
    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Latest committed image of a row
    pub(crate) fn committed_record(&self, id: &RecordId) -> Option<Record> {
        self.committed.get(id).and_then(|row| row.record.clone())
    }

    /// Publish committed row images originating from `origin`
    ///
    /// Callers hold the row locks of every id in `writes`.
    pub(crate) fn publish(&self, origin: ReplicaId, writes: Vec<(RecordId, Option<Record>)>) {
        if writes.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut rng = rand::thread_rng();
        for (id, record) in writes {
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
            let row = Versioned { record, version };
            self.committed.insert(id.clone(), row.clone());

            for replica in &self.replicas {
                if replica.id() == origin {
                    replica.apply(&id, row.clone());
                    continue;
                }
                let jitter = if self.config.propagation_jitter_ms > 0 {
                    rng.gen_range(0..=self.config.propagation_jitter_ms)
                } else {
                    0
                };
                let delay =
                    Duration::from_millis(self.config.propagation_delay_ms.saturating_add(jitter));
                replica.enqueue(id.clone(), row.clone(), now + delay);
            }
        }
    }
}

/// Handle to a simulated multi-master cluster
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Create a cluster with the given configuration
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let replicas = (0..config.replicas)
            .map(|i| ReplicaView::new(ReplicaId(i)))
            .collect();
        Ok(Self {
            inner: Arc::new(ClusterInner {
                config,
                committed: DashMap::new(),
                replicas,
                locks: LockTable::new(),
                faults: FaultInjector::new(),
                version: AtomicU64::new(0),
                next_session: AtomicU64::new(0),
                next_replica: AtomicUsize::new(0),
            }),
        })
    }

    /// Cluster configuration
    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Number of replicas
    pub fn replica_count(&self) -> usize {
        self.inner.replicas.len()
    }

    /// Fault injector shared by every session
    pub fn faults(&self) -> &FaultInjector {
        &self.inner.faults
    }

    /// Current global commit version
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Latest committed image of a record, bypassing every replica view
    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.inner.committed_record(id)
    }

    /// Number of live records
    pub fn record_count(&self) -> usize {
        self.inner
            .committed
            .iter()
            .filter(|row| row.value().record.is_some())
            .count()
    }

    /// Make every queued replication entry visible on every replica
    pub fn flush_replication(&self) {
        for replica in &self.inner.replicas {
            replica.flush();
        }
    }

    /// Entries not yet visible, summed over replicas
    pub fn replication_lag(&self) -> usize {
        self.inner.replicas.iter().map(|r| r.lag()).sum()
    }

    /// Seed the table with `num_records` records in state `available`
    ///
    /// Existing records are reset to `available`; missing ones are created.
    /// Returns the ids of the first `num_records` records, sorted.
    pub fn populate(&self, num_records: usize) -> Result<Vec<RecordId>> {
        let mut session = self.open_session(ReplicaId(0));
        session.begin()?;

        let mut existing: Vec<RecordId> = self
            .inner
            .committed
            .iter()
            .filter(|row| row.value().record.is_some())
            .map(|row| row.key().clone())
            .collect();
        existing.sort();

        for id in &existing {
            session.update_where(
                id,
                &[(rowbench_core::Field::Status, status::AVAILABLE.to_string())],
                &[],
            )?;
        }
        for _ in existing.len()..num_records {
            let id = RecordId::generate();
            session.insert(Record::new(id.clone(), status::AVAILABLE))?;
            existing.push(id);
        }
        session.commit()?;
        self.flush_replication();

        existing.truncate(num_records);
        existing.sort();
        tracing::debug!(records = existing.len(), "populated table");
        Ok(existing)
    }

    /// Open a concrete session on a replica
    pub fn open_session(&self, replica: ReplicaId) -> ClusterSession {
        ClusterSession::new(Arc::clone(&self.inner), replica)
    }

    fn check_replica(&self, replica: ReplicaId) -> Result<()> {
        if replica.0 >= self.inner.replicas.len() {
            return Err(Error::InvalidConfig(format!("unknown replica {}", replica)));
        }
        Ok(())
    }
}

impl Connector for Cluster {
    /// Round-robin over replicas: writes land on every node
    fn connect(&self) -> Result<Box<dyn Session>> {
        let n = self.inner.next_replica.fetch_add(1, Ordering::Relaxed) % self.replica_count();
        Ok(Box::new(self.open_session(ReplicaId(n))))
    }

    fn connect_replica(&self, replica: ReplicaId) -> Result<Box<dyn Session>> {
        self.check_replica(replica)?;
        Ok(Box::new(self.open_session(replica)))
    }

    fn replicas(&self) -> Vec<ReplicaId> {
        self.inner.replicas.iter().map(|r| r.id()).collect()
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("replicas", &self.replica_count())
            .field("version", &self.version())
            .field("records", &self.record_count())
            .field("lag", &self.replication_lag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbench_core::Field;

    fn cluster() -> Cluster {
        Cluster::new(
            ClusterConfig::new()
                .replicas(3)
                .propagation_delay(Duration::from_secs(60))
                .propagation_jitter(Duration::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert!(Cluster::new(ClusterConfig::new().replicas(0)).is_err());
    }

    #[test]
    fn test_unbounded_timings_rejected() {
        let too_long = Duration::from_millis(ClusterConfig::MAX_DELAY_MS + 1);
        for config in [
            ClusterConfig::new().propagation_delay(too_long),
            ClusterConfig::new().propagation_jitter(Duration::MAX),
            ClusterConfig::new().lock_wait_timeout(Duration::MAX),
        ] {
            assert!(matches!(Cluster::new(config), Err(Error::InvalidConfig(_))));
        }
        let longest = Duration::from_millis(ClusterConfig::MAX_DELAY_MS);
        assert!(Cluster::new(ClusterConfig::new().propagation_delay(longest)).is_ok());
    }

    #[test]
    fn test_populate_creates_and_resets() {
        let cluster = cluster();
        let ids = cluster.populate(4).unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(cluster.record_count(), 4);

        let mut s = cluster.open_session(ReplicaId(1));
        s.update_where(&ids[0], &[(Field::Status, "deleting".into())], &[]).unwrap();

        let again = cluster.populate(4).unwrap();
        assert_eq!(again, ids);
        assert_eq!(cluster.record(&ids[0]).unwrap().status, "available");
    }

    #[test]
    fn test_write_visible_on_origin_only_until_replicated() {
        let cluster = cluster();
        let ids = cluster.populate(1).unwrap();
        let id = &ids[0];

        let mut writer = cluster.open_session(ReplicaId(0));
        writer
            .update_where(id, &[(Field::Status, "deleting".into())], &[])
            .unwrap();

        let mut origin = cluster.open_session(ReplicaId(0));
        let mut other = cluster.open_session(ReplicaId(2));
        assert_eq!(origin.get(id).unwrap().unwrap().status, "deleting");
        assert_eq!(other.get(id).unwrap().unwrap().status, "available");
        assert!(cluster.replication_lag() > 0);

        cluster.flush_replication();
        assert_eq!(other.get(id).unwrap().unwrap().status, "deleting");
        assert_eq!(cluster.replication_lag(), 0);
    }

    #[test]
    fn test_connect_round_robin() {
        let cluster = cluster();
        let replicas: Vec<_> = (0..6).map(|_| cluster.connect().unwrap().replica()).collect();
        assert_eq!(
            replicas,
            vec![ReplicaId(0), ReplicaId(1), ReplicaId(2), ReplicaId(0), ReplicaId(1), ReplicaId(2)]
        );
    }

    #[test]
    fn test_connect_unknown_replica() {
        let cluster = cluster();
        let err = cluster.connect_replica(ReplicaId(9)).err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!err.is_retryable());
    }
}
