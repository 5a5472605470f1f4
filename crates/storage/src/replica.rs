//! Per-replica lagged views
//!
//! Every replica keeps its own copy of the rows. A commit is applied to the
//! originating replica immediately and queued for the others with a
//! visibility deadline (propagation delay). Pending entries are folded in
//! lazily on read, so no background thread is needed.
//!
//! Entries carry the global commit version; an entry older than what the
//! view already holds is dropped, so out-of-order delivery can never
//! resurrect a stale value.

use dashmap::DashMap;
use parking_lot::Mutex;
use rowbench_core::{Record, RecordId, ReplicaId};
use std::time::Instant;

/// A committed row image; `record == None` is a deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Row image after the commit
    pub record: Option<Record>,
    /// Global commit version
    pub version: u64,
}

#[derive(Debug)]
struct Pending {
    visible_at: Instant,
    id: RecordId,
    row: Versioned,
}

/// Rows as seen by one replica
#[derive(Debug)]
pub struct ReplicaView {
    id: ReplicaId,
    rows: DashMap<RecordId, Versioned>,
    pending: Mutex<Vec<Pending>>,
}

impl ReplicaView {
    /// Create an empty view
    pub fn new(id: ReplicaId) -> Self {
        Self {
            id,
            rows: DashMap::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Replica id
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Apply a row image now, unless the view already has a newer one
    pub fn apply(&self, id: &RecordId, row: Versioned) {
        let mut entry = self.rows.entry(id.clone()).or_insert_with(|| Versioned {
            record: None,
            version: 0,
        });
        if row.version > entry.version {
            *entry = row;
        }
    }

    /// Queue a row image that becomes visible at `visible_at`
    pub fn enqueue(&self, id: RecordId, row: Versioned, visible_at: Instant) {
        self.pending.lock().push(Pending { visible_at, id, row });
    }

    /// Apply every queued entry whose deadline has passed
    pub fn catch_up(&self, now: Instant) {
        let ready: Vec<Pending> = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return;
            }
            let (ready, waiting): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| p.visible_at <= now);
            *pending = waiting;
            ready
        };
        for p in ready {
            self.apply(&p.id, p.row);
        }
    }

    /// Apply every queued entry regardless of its deadline
    pub fn flush(&self) {
        let all: Vec<Pending> = self.pending.lock().drain(..).collect();
        for p in all {
            self.apply(&p.id, p.row);
        }
    }

    /// Read a record as currently visible on this replica
    pub fn read(&self, id: &RecordId) -> Option<Record> {
        self.catch_up(Instant::now());
        self.rows.get(id).and_then(|row| row.record.clone())
    }

    /// Number of queued entries not yet visible
    pub fn lag(&self) -> usize {
        self.pending.lock().len()
    }
}
