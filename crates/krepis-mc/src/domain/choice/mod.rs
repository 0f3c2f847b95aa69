//! Choice Generators - enumerable scheduling decisions
//!
//! # Overview
//!
//! A [`ChoiceGenerator`] is one nondeterministic scheduling decision: an
//! ordered, finite list of threads that may run next. The driver walks it
//! depth-first:
//!
//! ```text
//!          Created             Advancing                 Exhausted
//! cursor:   None  ──advance──>  Some(0) ──...──> Some(k-1) ───────────> (terminal)
//!                  returns c0              returns c(k-1)
//! ```
//!
//! The generators of the current execution form a [`ChoicePath`], a plain
//! stack replacing "previous generator" links: pushing when a decision is
//! made, popping when the search backtracks past it.

#[cfg(kani)]
mod proof;

use crate::domain::heap::ObjRef;
use crate::domain::threads::ThreadId;
use std::fmt;

/// Decision kind, one per scheduling-relevant operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
    /// First decision of a search
    Root,
    /// Entering a synchronized method
    SyncMethodEnter,
    /// `monitorenter`
    MonitorEnter,
    /// `Object.wait()`
    Wait,
    /// `Object.notify()`
    Notify,
    /// `LockSupport.park()`
    Park,
    /// `LockSupport.unpark()`
    Unpark,
    /// Access to a field of a shared object
    SharedField,
    /// Access to an element of a shared array
    SharedArray,
    /// `Thread.start()`
    Start,
    /// `Thread.yield()`
    Yield,
    /// `Thread.sleep()`
    Sleep,
    /// `Thread.interrupt()`
    Interrupt,
    /// Thread termination
    Terminate,
    /// `Thread.suspend()`
    Suspend,
    /// `Thread.resume()`
    Resume,
    /// Leaving an atomic section
    EndAtomic,
}

impl ChoiceKind {
    /// Tag identifying the decision kind in traces
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Root => "<root>",
            Self::SyncMethodEnter => "syncMethodEnter",
            Self::MonitorEnter => "monitorEnter",
            Self::Wait => "wait",
            Self::Notify => "notify",
            Self::Park => "park",
            Self::Unpark => "unpark",
            Self::SharedField => "sharedField",
            Self::SharedArray => "sharedArray",
            Self::Start => "start",
            Self::Yield => "yield",
            Self::Sleep => "sleep",
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::EndAtomic => "endAtomic",
        }
    }
}

impl fmt::Display for ChoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Array access that caused a `sharedArray` decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayAccess {
    /// Accessed array
    pub array: ObjRef,
    /// Load (`true`) or store (`false`)
    pub is_read: bool,
}

/// Lifecycle position of a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgState {
    /// No choice taken yet
    Created,
    /// Some, but not all, choices taken
    Advancing,
    /// Every choice taken
    Exhausted,
}

/// One enumerable scheduling decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceGenerator {
    kind: ChoiceKind,
    choices: Vec<ThreadId>,
    cursor: Option<usize>,
    creator: Option<ThreadId>,
    access: Option<ArrayAccess>,
    scheduling_point: bool,
}

impl ChoiceGenerator {
    /// Create a generator over `choices`, made by `creator`
    pub fn new(kind: ChoiceKind, choices: Vec<ThreadId>, creator: Option<ThreadId>) -> Self {
        Self {
            kind,
            choices,
            cursor: None,
            creator,
            access: None,
            scheduling_point: true,
        }
    }

    /// Root decision over the initially runnable threads
    pub fn root(choices: Vec<ThreadId>) -> Self {
        Self::new(ChoiceKind::Root, choices, None)
    }

    /// Attach the array access that caused this decision
    #[must_use]
    pub fn with_access(mut self, access: ArrayAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Mark the choices as data rather than threads to run next
    ///
    /// `notify` chooses which waiter to wake; the notifier keeps running.
    #[must_use]
    pub fn not_scheduling(mut self) -> Self {
        self.scheduling_point = false;
        self
    }

    /// Decision kind
    pub const fn kind(&self) -> ChoiceKind {
        self.kind
    }

    /// Candidates in enumeration order
    pub fn choices(&self) -> &[ThreadId] {
        &self.choices
    }

    /// Thread that reached the decision point
    pub const fn creator(&self) -> Option<ThreadId> {
        self.creator
    }

    /// Array access record, for `sharedArray` decisions
    pub const fn access(&self) -> Option<ArrayAccess> {
        self.access
    }

    /// Whether the chosen thread is the one that runs next
    pub const fn is_scheduling_point(&self) -> bool {
        self.scheduling_point
    }

    /// Number of choices
    pub fn total(&self) -> usize {
        self.choices.len()
    }

    /// Number of choices taken so far
    pub fn processed(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    /// Whether another [`advance`](Self::advance) yields a choice
    pub fn has_more(&self) -> bool {
        self.processed() < self.total()
    }

    /// Current lifecycle position
    pub fn state(&self) -> CgState {
        if !self.has_more() {
            CgState::Exhausted
        } else if self.cursor.is_none() {
            CgState::Created
        } else {
            CgState::Advancing
        }
    }

    /// Take the next choice
    pub fn advance(&mut self) -> Option<ThreadId> {
        if !self.has_more() {
            return None;
        }
        let next = self.processed();
        self.cursor = Some(next);
        self.choices.get(next).copied()
    }

    /// Choice taken by the last [`advance`](Self::advance)
    pub fn current(&self) -> Option<ThreadId> {
        self.cursor.and_then(|c| self.choices.get(c).copied())
    }

    /// Rewind to `Created`
    pub fn reset(&mut self) {
        self.cursor = None;
    }
}

impl fmt::Display for ChoiceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.kind)?;
        for (i, t) in self.choices.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if self.cursor == Some(i) {
                f.write_str(">")?;
            }
            write!(f, "{}", t.as_usize())?;
        }
        f.write_str("]")
    }
}

/// Generators of the current execution, oldest first
#[derive(Debug, Clone, Default)]
pub struct ChoicePath {
    stack: Vec<ChoiceGenerator>,
}

impl ChoicePath {
    /// Empty path
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `cg` the current decision
    pub fn push(&mut self, cg: ChoiceGenerator) {
        self.stack.push(cg);
    }

    /// Drop the current decision
    pub fn pop(&mut self) -> Option<ChoiceGenerator> {
        self.stack.pop()
    }

    /// Current decision
    pub fn top(&self) -> Option<&ChoiceGenerator> {
        self.stack.last()
    }

    /// Current decision, mutable
    pub fn top_mut(&mut self) -> Option<&mut ChoiceGenerator> {
        self.stack.last_mut()
    }

    /// Number of decisions on the path
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Check whether no decision was made yet
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Generators from newest to oldest
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &ChoiceGenerator> {
        self.stack.iter().rev()
    }

    /// Thread chosen at each decision, oldest first; replaying these
    /// reproduces the execution
    pub fn trace(&self) -> Vec<ThreadId> {
        self.stack.iter().filter_map(ChoiceGenerator::current).collect()
    }
}
