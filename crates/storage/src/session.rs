//! Cluster sessions
//!
//! A [`ClusterSession`] is one connection to one replica. Statements outside
//! an explicit transaction autocommit. Inside a transaction, writes are
//! buffered and row locks are held until `commit`/`rollback`; a locking read
//! sees the authoritative committed image overlaid with the session's own
//! buffered writes.
//!
//! Any store error raised inside a transaction rolls it back, like a server
//! aborting the transaction on deadlock. A lost connection is transparently
//! re-established by the next statement, the way a pooled driver reconnects.

use crate::cluster::ClusterInner;
use crate::faults::FaultPoint;
use rowbench_core::{
    CallSample, Error, Field, Record, RecordId, ReplicaId, Result, Session, StoreError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TxnState {
    locked: Vec<RecordId>,
    writes: Vec<(RecordId, Option<Record>)>,
}

impl TxnState {
    /// Latest buffered image of a row: `Some(None)` means deleted in this txn
    fn buffered(&self, id: &RecordId) -> Option<Option<Record>> {
        self.writes
            .iter()
            .rev()
            .find(|(wid, _)| wid == id)
            .map(|(_, rec)| rec.clone())
    }
}

/// One connection to a replica of a [`crate::Cluster`]
pub struct ClusterSession {
    id: u64,
    cluster: Arc<ClusterInner>,
    replica: ReplicaId,
    txn: Option<TxnState>,
    reconnects: u64,
    connected: bool,
    samples: BTreeMap<&'static str, (u64, Duration)>,
}

impl ClusterSession {
    pub(crate) fn new(cluster: Arc<ClusterInner>, replica: ReplicaId) -> Self {
        let id = cluster.next_session_id();
        Self {
            id,
            cluster,
            replica,
            txn: None,
            reconnects: 0,
            connected: true,
            samples: BTreeMap::new(),
        }
    }

    /// Server-side session id
    pub fn session_id(&self) -> u64 {
        self.id
    }

    /// Number of times this session reconnected after a lost connection
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    fn lock_timeout(&self) -> Duration {
        self.cluster.config.lock_wait_timeout_duration()
    }

    /// Run a statement, timing it under `name`
    fn timed<T>(&mut self, name: &'static str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = f(self);
        let sample = self.samples.entry(name).or_insert((0, Duration::ZERO));
        sample.0 += 1;
        sample.1 += start.elapsed();
        result
    }

    /// Entry check for every statement: reconnect if needed, fire armed faults
    fn enter(&mut self, point: FaultPoint) -> Result<()> {
        if !self.connected {
            self.connected = true;
            self.reconnects += 1;
            tracing::debug!(session = self.id, replica = %self.replica, "reconnected");
        }
        if let Err(e) = self.cluster.faults.check(point) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Turn a store error into an `Error`, aborting the open transaction
    fn fail(&mut self, err: StoreError) -> Error {
        self.abort();
        if err.is_disconnect() {
            self.connected = false;
        }
        Error::Store(err)
    }

    fn abort(&mut self) {
        if let Some(txn) = self.txn.take() {
            self.cluster.locks.release(&txn.locked, self.id);
        }
    }

    fn lock_row(&mut self, id: &RecordId) -> Result<()> {
        let timeout = self.lock_timeout();
        if let Err(e) = self.cluster.locks.acquire(id, self.id, timeout) {
            return Err(self.fail(e));
        }
        if let Some(txn) = self.txn.as_mut() {
            if !txn.locked.contains(id) {
                txn.locked.push(id.clone());
            }
        }
        Ok(())
    }

    /// Current image of a row for a writer: own buffered write, else committed
    fn current_for_write(&self, id: &RecordId) -> Option<Record> {
        match self.txn.as_ref().and_then(|t| t.buffered(id)) {
            Some(buffered) => buffered,
            None => self.cluster.committed_record(id),
        }
    }

    fn buffer_write(&mut self, id: RecordId, record: Option<Record>) -> Result<()> {
        match self.txn.as_mut() {
            Some(txn) => {
                txn.writes.push((id, record));
                Ok(())
            }
            None => Err(Error::Internal("write outside a transaction".into())),
        }
    }

    /// Run `f` inside the open transaction, or inside an implicit one
    fn autocommit<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.txn.is_some() {
            return f(self);
        }
        self.txn = Some(TxnState::default());
        match f(self) {
            Ok(value) => {
                self.finish_commit();
                Ok(value)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn finish_commit(&mut self) {
        if let Some(txn) = self.txn.take() {
            self.cluster.publish(self.replica, txn.writes);
            self.cluster.locks.release(&txn.locked, self.id);
        }
    }
}

fn matches_expected(record: &Record, expected: &[(Field, String)]) -> bool {
    expected
        .iter()
        .all(|(field, value)| record.field(*field) == Some(value.as_str()))
}

impl Session for ClusterSession {
    fn replica(&self) -> ReplicaId {
        self.replica
    }

    fn begin(&mut self) -> Result<()> {
        self.timed("begin", |s| {
            s.enter(FaultPoint::Begin)?;
            if s.txn.is_some() {
                return Err(Error::Internal("transaction already open".into()));
            }
            s.txn = Some(TxnState::default());
            Ok(())
        })
    }

    fn commit(&mut self) -> Result<()> {
        self.timed("commit", |s| {
            if s.txn.is_none() {
                return Ok(());
            }
            s.enter(FaultPoint::Commit)?;
            s.finish_commit();
            Ok(())
        })
    }

    fn rollback(&mut self) -> Result<()> {
        self.timed("rollback", |s| {
            s.abort();
            Ok(())
        })
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn get(&mut self, id: &RecordId) -> Result<Option<Record>> {
        self.timed("get", |s| {
            s.enter(FaultPoint::Get)?;
            if let Some(buffered) = s.txn.as_ref().and_then(|t| t.buffered(id)) {
                return Ok(buffered);
            }
            Ok(s.cluster.replicas[s.replica.0].read(id))
        })
    }

    fn select_for_update(&mut self, id: &RecordId) -> Result<Option<Record>> {
        self.timed("select_for_update", |s| {
            if s.txn.is_none() {
                return Err(Error::Internal(
                    "select_for_update requires an open transaction".into(),
                ));
            }
            s.enter(FaultPoint::SelectForUpdate)?;
            s.lock_row(id)?;
            Ok(s.current_for_write(id))
        })
    }

    fn update_where(
        &mut self,
        id: &RecordId,
        values: &[(Field, String)],
        expected: &[(Field, String)],
    ) -> Result<u64> {
        if values.is_empty() {
            return Err(Error::Internal("update with no new values".into()));
        }
        self.timed("update_where", |s| {
            s.enter(FaultPoint::UpdateWhere)?;
            s.autocommit(|s| {
                s.lock_row(id)?;
                let Some(mut record) = s.current_for_write(id) else {
                    return Ok(0);
                };
                if !matches_expected(&record, expected) {
                    return Ok(0);
                }
                for (field, value) in values {
                    record.set_field(*field, value.clone());
                }
                s.buffer_write(id.clone(), Some(record))?;
                Ok(1)
            })
        })
    }

    fn insert(&mut self, record: Record) -> Result<()> {
        self.timed("insert", |s| {
            s.enter(FaultPoint::Insert)?;
            s.autocommit(|s| {
                let id = record.id.clone();
                s.lock_row(&id)?;
                if s.current_for_write(&id).is_some() {
                    return Err(s.fail(StoreError::duplicate_key(&id)));
                }
                s.buffer_write(id, Some(record))
            })
        })
    }

    fn delete(&mut self, id: &RecordId) -> Result<u64> {
        self.timed("delete", |s| {
            s.enter(FaultPoint::Delete)?;
            s.autocommit(|s| {
                s.lock_row(id)?;
                if s.current_for_write(id).is_none() {
                    return Ok(0);
                }
                s.buffer_write(id.clone(), None)?;
                Ok(1)
            })
        })
    }

    fn take_call_samples(&mut self) -> Vec<CallSample> {
        std::mem::take(&mut self.samples)
            .into_iter()
            .map(|(name, (calls, elapsed))| CallSample {
                name: name.to_string(),
                calls,
                elapsed,
            })
            .collect()
    }
}

impl Drop for ClusterSession {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for ClusterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSession")
            .field("id", &self.id)
            .field("replica", &self.replica)
            .field("in_transaction", &self.txn.is_some())
            .finish()
    }
}
