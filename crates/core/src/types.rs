//! Core types for the contended record
//!
//! This module defines the data model shared by strategies, checker and harness:
//! - [`RecordId`]: stable 36-character identifier of a row
//! - [`Record`]: the row itself (`status`, `attach_status`, `migration_status`)
//! - [`TransitionAttempt`]: one `initial -> destination` move tagged with a marker
//! - [`ExpectedFields`]: field/value pairs the checker verifies on every replica

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Well-known values of the `status` column
pub mod status {
    /// Resting state of a record
    pub const AVAILABLE: &str = "available";
    /// Intermediate state held by the worker that won the transition
    pub const DELETING: &str = "deleting";
}

/// Identifier of a record (primary key, at most 36 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    /// Generate a fresh random identifier (UUID v4, hyphenated)
    ///
    /// # Examples
    ///
    /// ```
    /// use rowbench_core::RecordId;
    ///
    /// let a = RecordId::generate();
    /// let b = RecordId::generate();
    /// assert_ne!(a, b);
    /// assert_eq!(a.as_str().len(), 36);
    /// ```
    pub fn generate() -> Self {
        RecordId(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::new(s)
    }
}

/// Index of a replica (node) inside a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(pub usize);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Mutable columns of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// State of the record
    Status,
    /// Marker written alongside each transition
    AttachStatus,
    /// Unused by transitions, kept for schema parity
    MigrationStatus,
}

impl Field {
    /// Column name
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::AttachStatus => "attach_status",
            Field::MigrationStatus => "migration_status",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the single benchmark table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key
    pub id: RecordId,
    /// Current state
    pub status: String,
    /// Marker of the last transition, if any
    pub attach_status: Option<String>,
    /// Migration marker, never written by the benchmark
    pub migration_status: Option<String>,
}

impl Record {
    /// Create a record in the given state with no markers
    pub fn new(id: RecordId, status: impl Into<String>) -> Self {
        Self {
            id,
            status: status.into(),
            attach_status: None,
            migration_status: None,
        }
    }

    /// Read a field by name
    pub fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Status => Some(self.status.as_str()),
            Field::AttachStatus => self.attach_status.as_deref(),
            Field::MigrationStatus => self.migration_status.as_deref(),
        }
    }

    /// Overwrite a field
    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match field {
            Field::Status => self.status = value,
            Field::AttachStatus => self.attach_status = Some(value),
            Field::MigrationStatus => self.migration_status = Some(value),
        }
    }
}

/// Field/value pairs a record is expected to hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFields(Vec<(Field, String)>);

impl ExpectedFields {
    /// Empty expectation set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected value
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.0.push((field, value.into()));
        self
    }

    /// Iterate over the expectations
    pub fn iter(&self) -> impl Iterator<Item = &(Field, String)> {
        self.0.iter()
    }

    /// Number of expectations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no expectations
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExpectedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", field, value)?;
        }
        f.write_str("}")
    }
}

/// One attempt to move a record from `initial` to `destination`
///
/// The marker is unique per attempt so that the checker can tell "my write
/// applied and was later overwritten" apart from "my write never applied".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionAttempt {
    /// Target record
    pub record: RecordId,
    /// Required current state
    pub initial: String,
    /// State to move to
    pub destination: String,
    /// Value written to `attach_status`
    pub marker: String,
}

impl TransitionAttempt {
    /// Create a transition attempt
    pub fn new(
        record: RecordId,
        initial: impl Into<String>,
        destination: impl Into<String>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            record,
            initial: initial.into(),
            destination: destination.into(),
            marker: marker.into(),
        }
    }

    /// Marker for a worker's n-th iteration
    pub fn marker_for(worker: usize, sequence: usize) -> String {
        format!("{}_{}", worker, sequence)
    }

    /// The same transition in the opposite direction, keeping the marker
    pub fn reversed(&self) -> Self {
        Self {
            record: self.record.clone(),
            initial: self.destination.clone(),
            destination: self.initial.clone(),
            marker: self.marker.clone(),
        }
    }

    /// Field values every replica must eventually report after this attempt
    pub fn expected_after(&self) -> ExpectedFields {
        ExpectedFields::new()
            .with(Field::Status, self.destination.clone())
            .with(Field::AttachStatus, self.marker.clone())
    }
}
