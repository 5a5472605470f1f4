//! Core types for rowbench
//!
//! This crate defines the vocabulary shared by every other layer:
//! - [`Error`] / [`StoreError`]: canonical error taxonomy and transient-error classification
//! - [`Record`], [`RecordId`], [`TransitionAttempt`]: the contended row and one unit of work
//! - [`RetryCounters`]: per-attempt transient retry accounting
//! - [`ResultDataPoint`]: one measured transition cycle
//! - [`Session`] / [`Connector`]: the narrow storage collaborator interface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counters;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use counters::RetryCounters;
pub use error::{Error, Result, RetryKind, StoreError};
pub use result::{CallSample, Outcome, ResultDataPoint};
pub use traits::{Connector, Session};
pub use types::{
    status, ExpectedFields, Field, Record, RecordId, ReplicaId, TransitionAttempt,
};
