//! Deterministic partitioning of an id range across worker processes.
//!
//! An id goes to worker `(id mod process_count) + 1`. The rule depends only on
//! the id and the worker count, so re-running the same range reproduces the
//! same buckets. Worker index 0 belongs to the primary session and never
//! appears in an assignment.

use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use wosync_core::types::validate_order_prefix;
use wosync_core::{ItemKind, WorkItem};

/// A half-open id range `[start, stop)` of one record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Record kind
    pub kind: ItemKind,
    /// First id, inclusive
    pub start: u64,
    /// Last id, exclusive
    pub stop: u64,
    /// Prepended to order ids; empty for requests
    pub prefix: String,
}

impl RangeRequest {
    /// Request ids in `[start, stop)`.
    pub fn requests(start: u64, stop: u64) -> Self {
        Self {
            kind: ItemKind::Request,
            start,
            stop,
            prefix: String::new(),
        }
    }

    /// Order ids `prefix + n` for `n` in `[start, stop)`.
    pub fn orders(prefix: impl Into<String>, start: u64, stop: u64) -> Self {
        Self {
            kind: ItemKind::Order,
            start,
            stop,
            prefix: prefix.into(),
        }
    }

    /// Bounds after the kind-specific edge policy.
    ///
    /// Request id 0 does not exist upstream, so request ranges start at 1 and
    /// `stop` is raised to at least `start`. Order ranges are used as given.
    pub fn bounds(&self) -> (u64, u64) {
        match self.kind {
            ItemKind::Request => {
                let start = self.start.max(1);
                (start, self.stop.max(start))
            }
            ItemKind::Order => (self.start, self.stop),
        }
    }

    fn item(&self, id: u64) -> WorkItem {
        match self.kind {
            ItemKind::Request => WorkItem::request(id),
            ItemKind::Order => WorkItem::order(self.prefix.clone(), id),
        }
    }
}

/// The ordered items routed to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAssignment {
    worker_index: u32,
    items: Vec<WorkItem>,
}

impl ProcessAssignment {
    /// Bucket `items` for worker `worker_index`.
    pub fn new(worker_index: u32, items: Vec<WorkItem>) -> Self {
        Self {
            worker_index,
            items,
        }
    }

    /// Worker this bucket belongs to, 1-based.
    pub fn worker_index(&self) -> u32 {
        self.worker_index
    }

    /// Items in scrape order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the bucket has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take the items out of the bucket.
    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

/// Worker (1-based) that owns `id` when `process_count` workers run.
#[allow(clippy::cast_possible_truncation)]
pub fn assigned_worker(id: u64, process_count: u32) -> u32 {
    // The remainder is below a u32 divisor.
    (id % u64::from(process_count)) as u32 + 1
}

/// Split `request` into `process_count` buckets, indexed `1..=process_count`.
///
/// Items inside a bucket are in ascending id order. An empty range yields
/// empty buckets rather than an error.
///
/// # Errors
/// Returns `ScrapeError::Configuration` when `process_count` is 0 or an order
/// prefix is malformed.
pub fn partition(request: &RangeRequest, process_count: u32) -> Result<Vec<ProcessAssignment>> {
    if process_count < 1 {
        return Err(ScrapeError::Configuration(
            "process count must be at least 1".to_string(),
        ));
    }
    if request.kind == ItemKind::Order {
        validate_order_prefix(&request.prefix)
            .map_err(|e| ScrapeError::Configuration(e.to_string()))?;
    }

    let mut buckets: Vec<ProcessAssignment> = (1..=process_count)
        .map(|index| ProcessAssignment::new(index, Vec::new()))
        .collect();

    let (start, stop) = request.bounds();
    for id in start..stop {
        let worker = assigned_worker(id, process_count);
        buckets[(worker - 1) as usize].items.push(request.item(id));
    }

    Ok(buckets)
}

/// Total number of items across `assignments`.
pub fn total_items(assignments: &[ProcessAssignment]) -> usize {
    assignments.iter().map(ProcessAssignment::len).sum()
}
