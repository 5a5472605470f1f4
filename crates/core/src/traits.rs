//! Storage collaborator interface
//!
//! The benchmark core only needs a handful of primitives from the store:
//! point lookup, row lock on read, conditional UPDATE with WHERE-equality
//! predicates, insert/delete for the background load, and errors that carry
//! a classifiable code. [`Session`] is one connection; [`Connector`] opens
//! them. Sessions are never shared between threads of execution: each unit
//! of concurrency opens its own.

use crate::error::Result;
use crate::result::CallSample;
use crate::types::{Field, Record, RecordId, ReplicaId};

/// One connection to one replica
///
/// # Transactions
///
/// Outside a transaction every statement autocommits. Inside one
/// (`begin` .. `commit`/`rollback`) row locks taken by `select_for_update`
/// or by `update_where` are held until the transaction ends, and writes
/// become visible to other sessions at commit.
///
/// Any error raised by the store inside a transaction rolls it back.
pub trait Session: Send {
    /// Replica this session is connected to
    fn replica(&self) -> ReplicaId;

    /// Start a transaction
    fn begin(&mut self) -> Result<()>;

    /// Commit the current transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction, if any
    fn rollback(&mut self) -> Result<()>;

    /// Check if a transaction is open
    fn in_transaction(&self) -> bool;

    /// Plain read of a record as seen by this replica
    ///
    /// Never served from a transaction-local cache: a write committed on
    /// another replica is visible as soon as it has replicated here.
    fn get(&mut self, id: &RecordId) -> Result<Option<Record>>;

    /// Locking read (`SELECT ... FOR UPDATE`), requires an open transaction
    fn select_for_update(&mut self, id: &RecordId) -> Result<Option<Record>>;

    /// `UPDATE ... SET values WHERE id = ? AND field = value ...`
    ///
    /// Returns the number of rows affected (0 or 1).
    fn update_where(
        &mut self,
        id: &RecordId,
        values: &[(Field, String)],
        expected: &[(Field, String)],
    ) -> Result<u64>;

    /// Insert a new record
    fn insert(&mut self, record: Record) -> Result<()>;

    /// Delete a record, returning the number of rows affected
    fn delete(&mut self, id: &RecordId) -> Result<u64>;

    /// Take and reset per-call timing samples collected by this session
    fn take_call_samples(&mut self) -> Vec<CallSample>;
}

/// Opens sessions against a store
pub trait Connector: Send + Sync {
    /// Open a session on a write endpoint chosen by the connector
    fn connect(&self) -> Result<Box<dyn Session>>;

    /// Open a session pinned to one replica
    fn connect_replica(&self, replica: ReplicaId) -> Result<Box<dyn Session>>;

    /// Replicas reachable through this connector
    fn replicas(&self) -> Vec<ReplicaId>;
}
