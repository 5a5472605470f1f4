//! Error types for rowbench
//!
//! ## Taxonomy
//!
//! | Class | Variant | Handling |
//! |-------|---------|----------|
//! | Transient store error | `Store` with a classified code | retried by the retry policy, counted |
//! | Consistency mismatch | `WrongData` | retried by the checker to absorb replication lag |
//! | Unclassified / fatal | everything else | propagated, ends the current iteration |
//!
//! Precondition-not-met is deliberately absent: a row in the wrong state, or a
//! conditional update touching zero rows, is a normal wait signal and never
//! becomes an `Error`.

use crate::types::{Field, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Server error codes understood by the classifier.
pub mod codes {
    /// Lock wait timeout exceeded
    pub const LOCK_WAIT_TIMEOUT: u16 = 1205;
    /// Deadlock found when trying to get lock
    pub const DEADLOCK: u16 = 1213;
    /// Duplicate entry for primary key
    pub const DUPLICATE_KEY: u16 = 1062;
    /// Server has gone away
    pub const SERVER_GONE: u16 = 2006;
    /// Lost connection during query
    pub const LOST_CONNECTION: u16 = 2013;
    /// Commands out of sync, connection unusable
    pub const OUT_OF_SYNC: u16 = 2014;
    /// Lost connection while reading the handshake
    pub const LOST_HANDSHAKE: u16 = 2045;
    /// Lost connection at a system call
    pub const LOST_SYSTEM_CALL: u16 = 2055;
    /// Generic server error, never retried
    pub const GENERIC: u16 = 1105;
}

/// Classified transient failure kinds
///
/// Each kind owns a named counter in [`crate::RetryCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    /// Lock wait timeout exceeded
    LockTimeout,
    /// Deadlock detected by the store
    Deadlock,
    /// Connection to the store was lost
    Disconnect,
}

impl RetryKind {
    /// All kinds, in counter order
    pub const ALL: [RetryKind; 3] = [
        RetryKind::LockTimeout,
        RetryKind::Deadlock,
        RetryKind::Disconnect,
    ];

    /// Counter name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryKind::LockTimeout => "lock_timeout",
            RetryKind::Deadlock => "deadlock",
            RetryKind::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the storage collaborator
///
/// Carries the server error code and message, the same pair a SQL driver
/// surfaces. Classification is by code only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({code}, '{message}')")]
pub struct StoreError {
    /// Server error code
    pub code: u16,
    /// Server error message
    pub message: String,
}

impl StoreError {
    /// Create a store error from a code and message
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Lock wait timeout exceeded; try restarting transaction
    pub fn lock_wait_timeout() -> Self {
        Self::new(
            codes::LOCK_WAIT_TIMEOUT,
            "Lock wait timeout exceeded; try restarting transaction",
        )
    }

    /// Deadlock found when trying to get lock
    pub fn deadlock() -> Self {
        Self::new(
            codes::DEADLOCK,
            "Deadlock found when trying to get lock; try restarting transaction",
        )
    }

    /// Server has gone away
    pub fn server_gone() -> Self {
        Self::new(codes::SERVER_GONE, "Server has gone away")
    }

    /// Lost connection to server during query
    pub fn lost_connection() -> Self {
        Self::new(codes::LOST_CONNECTION, "Lost connection to server during query")
    }

    /// Duplicate entry for primary key
    pub fn duplicate_key(id: &RecordId) -> Self {
        Self::new(
            codes::DUPLICATE_KEY,
            format!("Duplicate entry '{}' for key 'PRIMARY'", id),
        )
    }

    /// Classify this error into a transient kind, if it is one
    pub fn kind(&self) -> Option<RetryKind> {
        match self.code {
            codes::LOCK_WAIT_TIMEOUT => Some(RetryKind::LockTimeout),
            codes::DEADLOCK => Some(RetryKind::Deadlock),
            codes::SERVER_GONE
            | codes::LOST_CONNECTION
            | codes::OUT_OF_SYNC
            | codes::LOST_HANDSHAKE
            | codes::LOST_SYSTEM_CALL => Some(RetryKind::Disconnect),
            _ => None,
        }
    }

    /// Check if this error means the connection is unusable
    pub fn is_disconnect(&self) -> bool {
        self.kind() == Some(RetryKind::Disconnect)
    }

    /// Check if this is a duplicate primary key error
    pub fn is_duplicate_key(&self) -> bool {
        self.code == codes::DUPLICATE_KEY
    }
}

/// All rowbench errors
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the store
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A replica returned a value different from the expected one
    #[error("wrong data in replica {replica} for {record}: {field} expected {expected:?}, got {actual:?}")]
    WrongData {
        /// Replica that returned the value
        replica: String,
        /// Record being checked
        record: RecordId,
        /// Field that did not match
        field: Field,
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
    },

    /// Record does not exist
    #[error("record {record} not found in {location}")]
    NotFound {
        /// Record looked up
        record: RecordId,
        /// Replica or store that was queried
        location: String,
    },

    /// Precondition was not met within the configured number of waits
    #[error("record {record} did not reach state {expected:?} after {waits} waits")]
    PreconditionTimeout {
        /// Record being transitioned
        record: RecordId,
        /// State the transition was waiting for
        expected: String,
        /// Number of waits performed
        waits: u32,
    },

    /// Transient retry budget exhausted
    #[error("retry budget of {retries} exhausted: {last}")]
    RetriesExhausted {
        /// Retries consumed
        retries: u32,
        /// Last transient error
        last: StoreError,
    },

    /// Distributed coordinator failure
    #[error("coordinator error: {0}")]
    Coordinator(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread panicked
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Id of the worker
        worker: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for rowbench operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Transient kind of this error, if it is a classified store error
    ///
    /// Only store errors are ever classified. A `WrongData` mismatch or a
    /// coordinator failure is never retryable by the retry policy.
    pub fn retry_kind(&self) -> Option<RetryKind> {
        match self {
            Error::Store(e) => e.kind(),
            _ => None,
        }
    }

    /// Check if the retry policy should retry this error
    pub fn is_retryable(&self) -> bool {
        self.retry_kind().is_some()
    }

    /// Check if this is a consistency mismatch
    pub fn is_wrong_data(&self) -> bool {
        matches!(self, Error::WrongData { .. })
    }

    /// Check if this is a store error with the given code
    pub fn is_store_code(&self, code: u16) -> bool {
        matches!(self, Error::Store(e) if e.code == code)
    }
}
