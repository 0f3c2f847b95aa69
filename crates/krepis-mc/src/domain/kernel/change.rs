//! Pull-based change tracking
//!
//! Every stateful component keeps a monotonic mutation epoch. Restores bump
//! epochs too, so "restored" counts as "changed". Consumers that cache
//! derived data keep a [`ChangeCursor`] and ask it whether anything moved
//! since their last query:
//!
//! ```text
//! mutate ─┐
//! mutate ─┼─> epoch advances ─> cursor.poll() == true   (once)
//! restore ┘                     cursor.poll() == false  (until next mutation)
//! ```
//!
//! No callback runs at mutation time; mutation sites stay unaware of who
//! consumes the change.

use super::KernelState;
use crate::error::KernelError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-component mutation epochs of a [`KernelState`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelEpoch {
    /// Heap epoch
    pub heap: u64,
    /// Static-area epoch
    pub statics: u64,
    /// Thread-list epoch
    pub threads: u64,
    /// Identity-counter epoch
    pub ids: u64,
    /// Atomic-section epoch
    pub atomic: u64,
}

impl KernelEpoch {
    /// Components whose epoch differs from `earlier`
    pub fn changed_since(&self, earlier: &Self) -> ChangedComponents {
        ChangedComponents {
            heap: self.heap != earlier.heap,
            statics: self.statics != earlier.statics,
            threads: self.threads != earlier.threads,
            ids: self.ids != earlier.ids,
            atomic: self.atomic != earlier.atomic,
        }
    }
}

/// Dirty flags per component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ChangedComponents {
    /// Heap changed
    pub heap: bool,
    /// Static area changed
    pub statics: bool,
    /// Thread list changed
    pub threads: bool,
    /// Identity counters changed
    pub ids: bool,
    /// Atomic section changed
    pub atomic: bool,
}

impl ChangedComponents {
    /// Everything dirty
    pub const ALL: Self = Self {
        heap: true,
        statics: true,
        threads: true,
        ids: true,
        atomic: true,
    };

    /// Whether any component changed
    pub const fn any(&self) -> bool {
        self.heap || self.statics || self.threads || self.ids || self.atomic
    }
}

/// "Changed since I last asked" query handle
#[derive(Debug, Clone, Default)]
pub struct ChangeCursor {
    seen: Option<KernelEpoch>,
}

impl ChangeCursor {
    /// Cursor that reports a change on its first poll
    pub fn new() -> Self {
        Self::default()
    }

    /// Report whether `ks` changed since the previous poll, and
    /// re-arm for the next mutation
    pub fn poll(&mut self, ks: &KernelState) -> bool {
        self.poll_components(ks).any()
    }

    /// Like [`poll`](Self::poll), broken down by component
    pub fn poll_components(&mut self, ks: &KernelState) -> ChangedComponents {
        let now = ks.epoch();
        let changed = self.seen.map_or(ChangedComponents::ALL, |seen| now.changed_since(&seen));
        self.seen = Some(now);
        changed
    }

    /// Treat the current state as already seen
    pub fn sync(&mut self, ks: &KernelState) {
        self.seen = Some(ks.epoch());
    }
}

/// Exclusive change cursor; at most one may exist per kernel state
///
/// The slot is released when the tracker is dropped.
#[derive(Debug)]
pub struct IncrementalTracker {
    cursor: ChangeCursor,
    slot: Arc<AtomicBool>,
}

impl IncrementalTracker {
    pub(crate) fn acquire(slot: &Arc<AtomicBool>) -> Result<Self, KernelError> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| KernelError::IncrementalTrackerConflict)?;
        Ok(Self {
            cursor: ChangeCursor::new(),
            slot: Arc::clone(slot),
        })
    }

    /// See [`ChangeCursor::poll`]
    pub fn poll(&mut self, ks: &KernelState) -> bool {
        self.cursor.poll(ks)
    }

    /// See [`ChangeCursor::poll_components`]
    pub fn poll_components(&mut self, ks: &KernelState) -> ChangedComponents {
        self.cursor.poll_components(ks)
    }

    /// See [`ChangeCursor::sync`]
    pub fn sync(&mut self, ks: &KernelState) {
        self.cursor.sync(ks);
    }
}

impl Drop for IncrementalTracker {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_since() {
        let a = KernelEpoch::default();
        let b = KernelEpoch { heap: 1, ..a };
        let diff = b.changed_since(&a);
        assert!(diff.heap);
        assert!(!diff.threads);
        assert!(diff.any());
        assert!(!a.changed_since(&a).any());
    }

    #[test]
    fn test_tracker_slot_is_exclusive() {
        let slot = Arc::new(AtomicBool::new(false));
        let first = IncrementalTracker::acquire(&slot).unwrap();
        assert_eq!(
            IncrementalTracker::acquire(&slot).unwrap_err(),
            KernelError::IncrementalTrackerConflict
        );
        drop(first);
        assert!(IncrementalTracker::acquire(&slot).is_ok());
    }
}
