//! Operation Log
//!
//! Bounded FIFO ring buffer of recent cache operations used for reporting.
//! Once the buffer grows past its capacity the oldest entries are dropped
//! until only `trim_to` remain.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::types::CacheOperation;

pub const OPERATION_LOG_CAPACITY: usize = 1000;
pub const OPERATION_LOG_TRIM_TO: usize = 500;

/// Shared operation log handle
#[derive(Clone)]
pub struct OperationLog {
    entries: Arc<RwLock<VecDeque<CacheOperation>>>,
    capacity: usize,
    trim_to: usize,
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLog {
    pub fn new() -> Self {
        Self::with_capacity(OPERATION_LOG_CAPACITY, OPERATION_LOG_TRIM_TO)
    }

    pub fn with_capacity(capacity: usize, trim_to: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity + 1))),
            capacity,
            trim_to: trim_to.min(capacity),
        }
    }

    /// Append an operation, trimming the oldest entries on overflow
    pub fn record(&self, op: CacheOperation) {
        let mut entries = self.entries.write();
        entries.push_back(op);

        if entries.len() > self.capacity {
            let excess = entries.len() - self.trim_to;
            entries.drain(..excess);
            debug!("Operation log trimmed by {} entries", excess);
        }
    }

    /// Last `count` operations in chronological order
    pub fn recent(&self, count: usize) -> Vec<CacheOperation> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<CacheOperation> {
        self.entries.read().iter().cloned().collect()
    }

    /// Run a read-only computation over the buffered entries
    pub fn inspect<R>(&self, f: impl FnOnce(&VecDeque<CacheOperation>) -> R) -> R {
        f(&self.entries.read())
    }

    /// Drop every entry not strictly newer than `cutoff`; returns removed count
    pub fn retain_newer_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|op| op.timestamp > cutoff);
        before - entries.len()
    }

    /// Keep only the newest `max_len` entries; returns removed count
    pub fn truncate_oldest(&self, max_len: usize) -> usize {
        let mut entries = self.entries.write();
        let excess = entries.len().saturating_sub(max_len);
        entries.drain(..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
