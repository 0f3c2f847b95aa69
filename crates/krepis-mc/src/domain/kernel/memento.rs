//! Kernel snapshots
//!
//! A [`KernelMemento`] is a composite of the component mementos. Every
//! component memento shares structure with the live state (`Arc`ed chunks
//! and threads), so taking one costs a few pointer copies plus whatever was
//! dirtied since the previous snapshot.
//!
//! Restoring has a fixed order:
//!
//! ```text
//! threads ──> statics ──> heap ──> ids + atomic section
//! ```
//!
//! The heap goes after threads and statics because its reachability-derived
//! attributes (sharedness, pins held by thread objects) refer to them.
//! [`RestoreSequence`] enforces the order; a violation is an engine bug.

use super::{AtomicSection, KernelState};
use crate::domain::heap::HeapMemento;
use crate::domain::identity::IdMemento;
use crate::domain::statics::StaticsMemento;
use crate::domain::threads::ThreadListMemento;

/// Restorable snapshot of a whole [`KernelState`]
#[derive(Debug, Clone)]
pub struct KernelMemento {
    pub(super) threads: ThreadListMemento,
    pub(super) statics: StaticsMemento,
    pub(super) heap: HeapMemento,
    pub(super) ids: IdMemento,
    pub(super) atomic: AtomicSection,
}

impl KernelMemento {
    /// Reinstate this snapshot into `ks`
    pub fn restore(&self, ks: &mut KernelState) {
        ks.restore(self);
    }

    /// Number of live objects captured
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }
}

/// Component restore stages, in the only permitted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum RestorePhase {
    Idle,
    Threads,
    Statics,
    Heap,
    Identity,
}

/// Guard that panics when restore stages run out of order
#[derive(Debug)]
pub(crate) struct RestoreSequence {
    phase: RestorePhase,
}

impl RestoreSequence {
    pub(crate) const fn new() -> Self {
        Self {
            phase: RestorePhase::Idle,
        }
    }

    /// Move to `next`
    ///
    /// # Panics
    ///
    /// Panics unless `next` is the stage right after the current one.
    pub(crate) fn enter(&mut self, next: RestorePhase) {
        let expected = match self.phase {
            RestorePhase::Idle => RestorePhase::Threads,
            RestorePhase::Threads => RestorePhase::Statics,
            RestorePhase::Statics => RestorePhase::Heap,
            RestorePhase::Heap | RestorePhase::Identity => RestorePhase::Identity,
        };
        assert!(
            next == expected && next != self.phase,
            "memento restore out of order: {next:?} after {:?}",
            self.phase
        );
        self.phase = next;
    }

    pub(crate) fn finish(self) {
        assert_eq!(self.phase, RestorePhase::Identity, "memento restore incomplete");
    }
}
