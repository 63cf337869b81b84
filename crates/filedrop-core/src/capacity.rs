//! Queue capacity accounting and the capacity notice sink.
//!
//! Capacity is checked when items are inserted, never retroactively. When an intake
//! batch does not fit, the surplus is dropped and a single [`CapacityNotice`] is sent
//! to the configured [`NoticeSink`].

use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Informational notice emitted once per intake batch that had to be truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityNotice {
    /// Number of files left out of the batch.
    pub dropped: usize,
    /// Configured maximum number of items.
    pub limit: usize,
}

impl CapacityNotice {
    /// `None` when nothing was dropped or there is no limit.
    pub fn for_dropped(limit: Option<usize>, dropped: usize) -> Option<Self> {
        match limit {
            Some(limit) if dropped > 0 => Some(Self { dropped, limit }),
            _ => None,
        }
    }
}

impl Display for CapacityNotice {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} file(s) were not added: the list is limited to {} item(s)",
            self.dropped, self.limit
        )
    }
}

/// Receives capacity notices. Implemented for any `Fn(CapacityNotice)`.
pub trait NoticeSink: Send + Sync {
    fn capacity_exceeded(&self, notice: CapacityNotice);
}

impl<F> NoticeSink for F
where
    F: Fn(CapacityNotice) + Send + Sync,
{
    fn capacity_exceeded(&self, notice: CapacityNotice) {
        self(notice)
    }
}

/// No-op sink for callers that do not surface capacity notices.
pub struct NoOpNoticeSink;

impl NoticeSink for NoOpNoticeSink {
    fn capacity_exceeded(&self, _notice: CapacityNotice) {}
}

/// Number of items that still fit. `None` limit means unbounded.
pub fn remaining_capacity(limit: Option<usize>, current: usize) -> usize {
    limit.map_or(usize::MAX, |limit| limit.saturating_sub(current))
}
