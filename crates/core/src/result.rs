//! Result data points emitted by benchmark workers

use crate::counters::RetryCounters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal status of one transition cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Cycle completed
    Ok,
    /// Cycle failed; holds the failure description
    Failed(String),
}

impl Outcome {
    /// Check if the cycle completed
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// Aggregated timing of one store call name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSample {
    /// Call name (e.g. `select_for_update`)
    pub name: String,
    /// Number of calls
    pub calls: u64,
    /// Total time spent in the calls
    pub elapsed: Duration,
}

/// One measured transition cycle (`A -> B`, check, `B -> A`)
///
/// Created by a worker, immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDataPoint {
    /// Worker that produced the point
    pub worker: usize,
    /// Iteration number inside the worker
    pub sequence: usize,
    /// Terminal status
    pub outcome: Outcome,
    /// Wall-clock start of the cycle
    pub started_at: DateTime<Utc>,
    /// Elapsed time of the acquire (`A -> B`) transition
    pub acquire: Duration,
    /// Elapsed time of the release (`B -> A`) transition
    pub release: Duration,
    /// Transient retries consumed across both transitions
    pub counters: RetryCounters,
    /// Non-fatal consistency check failure, if any
    pub check_error: Option<String>,
    /// Per-call profiling samples, when profiling is enabled
    pub profile: Option<Vec<CallSample>>,
}

impl ResultDataPoint {
    /// Successful cycle
    pub fn ok(worker: usize, sequence: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            worker,
            sequence,
            outcome: Outcome::Ok,
            started_at,
            acquire: Duration::ZERO,
            release: Duration::ZERO,
            counters: RetryCounters::new(),
            check_error: None,
            profile: None,
        }
    }

    /// Failed cycle
    pub fn failed(
        worker: usize,
        sequence: usize,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            outcome: Outcome::Failed(reason.into()),
            ..Self::ok(worker, sequence, started_at)
        }
    }

    /// Check if the cycle completed
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
