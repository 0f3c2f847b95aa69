//! Observation hooks for external collaborators
//!
//! The core only announces *that* something happened; what an observer does
//! with it (tracing, property checks, coverage) is up to the observer. Every
//! hook has an empty default body, so an observer implements just the
//! events it cares about.

use crate::domain::choice::ChoiceGenerator;
use crate::domain::heap::{ClassId, ObjRef};
use crate::domain::identity::{GlobalId, MethodId};
use crate::domain::threads::ThreadId;
use std::fmt;
use tracing::trace;

/// Receiver of engine events
#[allow(unused_variables)]
pub trait VmObserver: Send {
    /// An instruction of `thread` was executed
    fn instruction_executed(&mut self, thread: ThreadId, method: MethodId, insn: u32) {}

    /// `thread` was started
    fn thread_started(&mut self, thread: ThreadId) {}
    /// `thread` blocked on the monitor of `object`
    fn thread_blocked(&mut self, thread: ThreadId, object: ObjRef) {}
    /// `thread` started waiting on `object`
    fn thread_waiting(&mut self, thread: ThreadId, object: ObjRef) {}
    /// `thread` was notified
    fn thread_notified(&mut self, thread: ThreadId) {}
    /// `thread` terminated
    fn thread_terminated(&mut self, thread: ThreadId) {}

    /// A class got its static slot
    fn class_loaded(&mut self, class: ClassId) {}

    /// An object was allocated
    fn object_created(&mut self, thread: Option<ThreadId>, object: ObjRef) {}
    /// An object was reclaimed by GC
    fn object_released(&mut self, object: ObjRef, global_id: GlobalId) {}
    /// `thread` acquired the monitor of `object`
    fn object_locked(&mut self, thread: ThreadId, object: ObjRef) {}
    /// `thread` released the monitor of `object`
    fn object_unlocked(&mut self, thread: ThreadId, object: ObjRef) {}

    /// A GC pass starts
    fn gc_begin(&mut self) {}
    /// A GC pass ended
    fn gc_end(&mut self) {}

    /// A generator was created for a decision point
    fn choice_generator_registered(&mut self, cg: &ChoiceGenerator) {}
    /// A generator became the current decision
    fn choice_generator_set(&mut self, cg: &ChoiceGenerator) {}
    /// A generator moved to its next choice
    fn choice_generator_advanced(&mut self, cg: &ChoiceGenerator) {}
    /// A generator was exhausted and dropped
    fn choice_generator_processed(&mut self, cg: &ChoiceGenerator) {}

    /// `thread` entered `method`
    fn method_entered(&mut self, thread: ThreadId, method: MethodId) {}
    /// `thread` left `method`
    fn method_exited(&mut self, thread: ThreadId, method: MethodId) {}

    /// The search reached a new state
    fn state_advanced(&mut self, depth: usize, is_new: bool) {}
    /// The search restored an earlier state
    fn state_backtracked(&mut self, depth: usize) {}
}

/// Ordered collection of observers; events are delivered in registration
/// order
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn VmObserver>>,
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

macro_rules! forward {
    ($(#[$doc:meta] $name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            #[$doc]
            pub fn $name(&mut self, $($arg: $ty),*) {
                for o in &mut self.observers {
                    o.$name($($arg),*);
                }
            }
        )*
    };
}

impl ObserverSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn add(&mut self, observer: Box<dyn VmObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    forward! {
        /// Forward [`VmObserver::instruction_executed`]
        instruction_executed(thread: ThreadId, method: MethodId, insn: u32);
        /// Forward [`VmObserver::thread_started`]
        thread_started(thread: ThreadId);
        /// Forward [`VmObserver::thread_blocked`]
        thread_blocked(thread: ThreadId, object: ObjRef);
        /// Forward [`VmObserver::thread_waiting`]
        thread_waiting(thread: ThreadId, object: ObjRef);
        /// Forward [`VmObserver::thread_notified`]
        thread_notified(thread: ThreadId);
        /// Forward [`VmObserver::thread_terminated`]
        thread_terminated(thread: ThreadId);
        /// Forward [`VmObserver::class_loaded`]
        class_loaded(class: ClassId);
        /// Forward [`VmObserver::object_created`]
        object_created(thread: Option<ThreadId>, object: ObjRef);
        /// Forward [`VmObserver::object_released`]
        object_released(object: ObjRef, global_id: GlobalId);
        /// Forward [`VmObserver::object_locked`]
        object_locked(thread: ThreadId, object: ObjRef);
        /// Forward [`VmObserver::object_unlocked`]
        object_unlocked(thread: ThreadId, object: ObjRef);
        /// Forward [`VmObserver::gc_begin`]
        gc_begin();
        /// Forward [`VmObserver::gc_end`]
        gc_end();
        /// Forward [`VmObserver::choice_generator_registered`]
        choice_generator_registered(cg: &ChoiceGenerator);
        /// Forward [`VmObserver::choice_generator_set`]
        choice_generator_set(cg: &ChoiceGenerator);
        /// Forward [`VmObserver::choice_generator_advanced`]
        choice_generator_advanced(cg: &ChoiceGenerator);
        /// Forward [`VmObserver::choice_generator_processed`]
        choice_generator_processed(cg: &ChoiceGenerator);
        /// Forward [`VmObserver::method_entered`]
        method_entered(thread: ThreadId, method: MethodId);
        /// Forward [`VmObserver::method_exited`]
        method_exited(thread: ThreadId, method: MethodId);
        /// Forward [`VmObserver::state_advanced`]
        state_advanced(depth: usize, is_new: bool);
        /// Forward [`VmObserver::state_backtracked`]
        state_backtracked(depth: usize);
    }
}

/// Observer that reports every event as a `tracing` event at TRACE level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl VmObserver for TracingObserver {
    fn thread_started(&mut self, thread: ThreadId) {
        trace!(%thread, "thread started");
    }

    fn thread_blocked(&mut self, thread: ThreadId, object: ObjRef) {
        trace!(%thread, %object, "thread blocked");
    }

    fn thread_waiting(&mut self, thread: ThreadId, object: ObjRef) {
        trace!(%thread, %object, "thread waiting");
    }

    fn thread_notified(&mut self, thread: ThreadId) {
        trace!(%thread, "thread notified");
    }

    fn thread_terminated(&mut self, thread: ThreadId) {
        trace!(%thread, "thread terminated");
    }

    fn class_loaded(&mut self, class: ClassId) {
        trace!(%class, "class loaded");
    }

    fn object_released(&mut self, object: ObjRef, global_id: GlobalId) {
        trace!(%object, %global_id, "object released");
    }

    fn object_locked(&mut self, thread: ThreadId, object: ObjRef) {
        trace!(%thread, %object, "monitor acquired");
    }

    fn object_unlocked(&mut self, thread: ThreadId, object: ObjRef) {
        trace!(%thread, %object, "monitor released");
    }

    fn choice_generator_registered(&mut self, cg: &ChoiceGenerator) {
        trace!(kind = cg.kind().tag(), choices = cg.total(), "choice generator registered");
    }

    fn choice_generator_advanced(&mut self, cg: &ChoiceGenerator) {
        trace!(kind = cg.kind().tag(), choice = ?cg.current(), "choice generator advanced");
    }

    fn state_backtracked(&mut self, depth: usize) {
        trace!(depth, "backtracked");
    }
}
