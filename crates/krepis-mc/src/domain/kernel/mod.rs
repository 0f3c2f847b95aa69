//! Kernel State - the complete mutable state of one explored program state
//!
//! # Architecture
//!
//! ```text
//! KernelState
//!  ├─ classes   ClassRegistry     shared by all paths, never restored
//!  ├─ threads   ThreadList        ─┐
//!  ├─ statics   StaticArea         │ captured by snapshot()
//!  ├─ heap      Heap               │ reinstated by restore()
//!  ├─ ids       GlobalIdManager    │
//!  ├─ atomic    AtomicSection     ─┘
//!  └─ observers ObserverSet       notified, never restored
//! ```
//!
//! Every component owns a mutation epoch; [`KernelState::epoch`] bundles
//! them for pull-based change tracking (see [`ChangeCursor`]).
//!
//! # Identity
//!
//! Objects, thread objects and class objects are stamped with a
//! [`GlobalId`] on creation. Threads use their own global id for the thread
//! object; class objects use an id derived from the class alone so that
//! load order does not leak into fingerprints.

mod change;
mod memento;
mod monitor;

pub use change::{ChangeCursor, ChangedComponents, IncrementalTracker, KernelEpoch};
pub use memento::KernelMemento;
pub use monitor::LockOutcome;

use crate::config::CheckerConfig;
use crate::domain::heap::{
    ClassDescriptor, ClassId, ClassInitStatus, ClassRegistry, GcRoots, GcStats, Heap, ObjRef,
    ValueKind, CLASS_CLASS, STRING_CLASS, THREAD_CLASS,
};
use crate::domain::identity::{CreationSite, GlobalId, GlobalIdManager, IdPool};
use crate::domain::observer::{ObserverSet, VmObserver};
use crate::domain::statics::{InitCheck, StaticArea};
use crate::domain::threads::{StackFrame, ThreadId, ThreadInfo, ThreadList, ThreadState};
use crate::error::KernelError;
use memento::{RestorePhase, RestoreSequence};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Atomic Section
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declared atomic section of the running thread
///
/// While a thread is inside one, the scheduler suppresses the scheduling
/// points it would otherwise create for that thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtomicSection {
    owner: Option<ThreadId>,
    depth: u32,
    blocked_in_atomic: bool,
}

impl AtomicSection {
    /// Thread inside the section
    pub const fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Nesting depth
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether the owner blocked while inside the section on this path
    pub const fn is_blocked_in_atomic(&self) -> bool {
        self.blocked_in_atomic
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kernel State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Heap, statics, threads, identity counters and atomic section of one
/// program state
#[derive(Debug)]
pub struct KernelState {
    classes: ClassRegistry,
    heap: Heap,
    statics: StaticArea,
    threads: ThreadList,
    ids: GlobalIdManager,
    atomic: AtomicSection,
    atomic_epoch: u64,
    tracker_slot: Arc<AtomicBool>,
    observers: ObserverSet,
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelState {
    /// Empty kernel state with a fresh class registry and id pool
    pub fn new() -> Self {
        KernelStateBuilder::new().build()
    }

    /// Start configuring a kernel state
    pub fn builder() -> KernelStateBuilder {
        KernelStateBuilder::new()
    }

    // ─── Components ─────────────────────────────────────────────────────────

    /// Class registry
    pub const fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Heap
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Heap, mutable
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Static area
    pub const fn statics(&self) -> &StaticArea {
        &self.statics
    }

    /// Thread list
    pub const fn threads(&self) -> &ThreadList {
        &self.threads
    }

    /// Thread list, mutable
    pub fn threads_mut(&mut self) -> &mut ThreadList {
        &mut self.threads
    }

    /// Identity manager
    pub const fn ids(&self) -> &GlobalIdManager {
        &self.ids
    }

    /// Atomic section
    pub const fn atomic(&self) -> &AtomicSection {
        &self.atomic
    }

    /// Registered observers
    pub fn observers_mut(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }

    /// Register an observer
    pub fn add_observer(&mut self, observer: Box<dyn VmObserver>) {
        self.observers.add(observer);
    }

    // ─── Change Tracking & Snapshots ────────────────────────────────────────

    /// Current per-component mutation epochs
    pub fn epoch(&self) -> KernelEpoch {
        KernelEpoch {
            heap: self.heap.epoch(),
            statics: self.statics.epoch(),
            threads: self.threads.epoch(),
            ids: self.ids.epoch(),
            atomic: self.atomic_epoch,
        }
    }

    /// Claim the exclusive incremental change tracker
    ///
    /// # Errors
    ///
    /// [`KernelError::IncrementalTrackerConflict`] while another tracker is
    /// alive.
    pub fn register_incremental_tracker(&self) -> Result<IncrementalTracker, KernelError> {
        IncrementalTracker::acquire(&self.tracker_slot)
    }

    /// Capture the complete restorable state
    pub fn snapshot(&mut self) -> KernelMemento {
        KernelMemento {
            threads: self.threads.memento(),
            statics: self.statics.memento(),
            heap: self.heap.memento(),
            ids: self.ids.memento(),
            atomic: self.atomic,
        }
    }

    /// Reinstate `memento`; afterwards the state is indistinguishable from
    /// the state at capture time
    pub fn restore(&mut self, memento: &KernelMemento) {
        let mut seq = RestoreSequence::new();
        seq.enter(RestorePhase::Threads);
        self.threads.restore(&memento.threads);
        seq.enter(RestorePhase::Statics);
        self.statics.restore(&memento.statics);
        seq.enter(RestorePhase::Heap);
        self.heap.restore(&memento.heap);
        seq.enter(RestorePhase::Identity);
        self.ids.restore(&memento.ids);
        self.atomic = memento.atomic;
        self.atomic_epoch += 1;
        seq.finish();
    }

    // ─── Identity ───────────────────────────────────────────────────────────

    /// Global id for the next creation by `creator` at `site`
    pub fn new_global_id(&mut self, creator: Option<ThreadId>, site: Option<CreationSite>) -> GlobalId {
        let tgid = creator.map(|t| self.threads.get(t).global_id());
        self.ids.new_id(tgid, site)
    }

    // ─── Classes & Statics ──────────────────────────────────────────────────

    /// Register a class descriptor
    pub fn register_class(&self, class: ClassDescriptor) -> ClassId {
        self.classes.register(class)
    }

    /// Create the static slot and class object of `class` if missing
    pub fn load_class(&mut self, class: ClassId) -> ClassId {
        if self.statics.contains(class) {
            return class;
        }
        let desc = self.classes.get(class);
        let class_class = self.classes.register(ClassDescriptor::builder(CLASS_CLASS).build());
        let gid = self.ids.class_object_id(class.0);
        let class_object = self.heap.allocate(&self.classes.get(class_class), None, gid);
        self.statics.add_class(&desc, gid, class_object);

        debug!(class = desc.name(), %class_object, "class loaded");
        self.observers.object_created(None, class_object);
        self.observers.class_loaded(class);
        class
    }

    /// Load a class by name
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] if no descriptor is registered.
    pub fn load_class_named(&mut self, name: &str) -> Result<ClassId, KernelError> {
        let id = self
            .classes
            .lookup(name)
            .ok_or_else(|| KernelError::ClassNotLoaded(name.to_owned()))?;
        Ok(self.load_class(id))
    }

    /// Whether `thread` may touch the statics of `class`
    pub fn check_class_initialized(&self, class: ClassId, thread: ThreadId) -> InitCheck {
        self.statics.check_initialized(class, thread)
    }

    /// Advance the init status of `class`
    ///
    /// # Errors
    ///
    /// See [`StaticArea::set_status`].
    pub fn set_class_status(&mut self, class: ClassId, status: ClassInitStatus) -> Result<(), KernelError> {
        self.statics.set_status(class, status)
    }

    // ─── Allocation ─────────────────────────────────────────────────────────

    /// Allocate an instance of `class`
    pub fn new_object(&mut self, class: ClassId, thread: Option<ThreadId>, site: Option<CreationSite>) -> ObjRef {
        let gid = self.new_global_id(thread, site);
        let desc = self.classes.get(class);
        let objref = self.heap.allocate(&desc, thread, gid);
        self.observers.object_created(thread, objref);
        objref
    }

    /// Allocate an array
    pub fn new_array(
        &mut self,
        elem: ValueKind,
        length: usize,
        thread: Option<ThreadId>,
        site: Option<CreationSite>,
    ) -> ObjRef {
        let gid = self.new_global_id(thread, site);
        let class = self.classes.array_class(elem);
        let objref = self.heap.allocate_array(class, elem, length, thread, gid);
        self.observers.object_created(thread, objref);
        objref
    }

    /// Canonical string object for `value`
    ///
    /// The same value yields the same object for as long as it is live on
    /// the current path; interned strings are pinned.
    pub fn intern_string(&mut self, value: &str, thread: Option<ThreadId>) -> ObjRef {
        if let Some(existing) = self.heap.interned(value) {
            return existing;
        }
        let units: Vec<u16> = value.encode_utf16().collect();
        let chars = self.new_array(ValueKind::Char, units.len(), thread, None);
        {
            let fields = self.heap.get_mut(chars).fields_mut();
            for (i, unit) in units.iter().enumerate() {
                fields.set_int(i, i32::from(*unit));
            }
        }

        let string_class = self
            .classes
            .register(ClassDescriptor::builder(STRING_CLASS).field("value", ValueKind::Reference).build());
        let string = self.new_object(string_class, thread, None);
        if let Some((slot, _)) = self.classes.get(string_class).instance_layout().lookup("value") {
            self.heap.get_mut(string).fields_mut().set_ref(slot, chars);
        }
        self.heap.record_interned(value, string);
        string
    }

    // ─── Field Access ───────────────────────────────────────────────────────

    fn instance_field(&self, obj: ObjRef, name: &str) -> Result<usize, KernelError> {
        let class = self.classes.get(self.heap.get(obj).class());
        class
            .instance_layout()
            .lookup(name)
            .map(|(slot, _)| slot)
            .ok_or_else(|| KernelError::UnknownField {
                class: class.name().to_owned(),
                field: name.to_owned(),
            })
    }

    fn static_field(&self, class: ClassId, name: &str) -> Result<usize, KernelError> {
        let desc = self.classes.get(class);
        if !self.statics.contains(class) {
            return Err(KernelError::ClassNotLoaded(desc.name().to_owned()));
        }
        desc.static_layout()
            .lookup(name)
            .map(|(slot, _)| slot)
            .ok_or_else(|| KernelError::UnknownField {
                class: desc.name().to_owned(),
                field: name.to_owned(),
            })
    }

    /// Read an int-sized instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn get_int_field(&self, obj: ObjRef, name: &str) -> Result<i32, KernelError> {
        let slot = self.instance_field(obj, name)?;
        Ok(self.heap.get(obj).fields().get_int(slot))
    }

    /// Write an int-sized instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn set_int_field(&mut self, obj: ObjRef, name: &str, value: i32) -> Result<(), KernelError> {
        let slot = self.instance_field(obj, name)?;
        self.heap.get_mut(obj).fields_mut().set_int(slot, value);
        Ok(())
    }

    /// Read a long instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn get_long_field(&self, obj: ObjRef, name: &str) -> Result<i64, KernelError> {
        let slot = self.instance_field(obj, name)?;
        Ok(self.heap.get(obj).fields().get_long(slot))
    }

    /// Write a long instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn set_long_field(&mut self, obj: ObjRef, name: &str, value: i64) -> Result<(), KernelError> {
        let slot = self.instance_field(obj, name)?;
        self.heap.get_mut(obj).fields_mut().set_long(slot, value);
        Ok(())
    }

    /// Read a reference instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn get_ref_field(&self, obj: ObjRef, name: &str) -> Result<ObjRef, KernelError> {
        let slot = self.instance_field(obj, name)?;
        Ok(self.heap.get(obj).fields().get_ref(slot))
    }

    /// Write a reference instance field
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownField`] if the class declares no such field.
    pub fn set_ref_field(&mut self, obj: ObjRef, name: &str, value: ObjRef) -> Result<(), KernelError> {
        let slot = self.instance_field(obj, name)?;
        self.heap.get_mut(obj).fields_mut().set_ref(slot, value);
        Ok(())
    }

    /// Read an int-sized static field
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] or [`KernelError::UnknownField`].
    pub fn get_static_int(&self, class: ClassId, name: &str) -> Result<i32, KernelError> {
        let slot = self.static_field(class, name)?;
        Ok(self.statics.get(class).map_or(0, |s| s.fields().get_int(slot)))
    }

    /// Write an int-sized static field
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] or [`KernelError::UnknownField`].
    pub fn set_static_int(&mut self, class: ClassId, name: &str, value: i32) -> Result<(), KernelError> {
        let slot = self.static_field(class, name)?;
        if let Some(s) = self.statics.get_mut(class) {
            s.fields_mut().set_int(slot, value);
        }
        Ok(())
    }

    /// Read a reference static field
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] or [`KernelError::UnknownField`].
    pub fn get_static_ref(&self, class: ClassId, name: &str) -> Result<ObjRef, KernelError> {
        let slot = self.static_field(class, name)?;
        Ok(self.statics.get(class).map_or(ObjRef::NULL, |s| s.fields().get_ref(slot)))
    }

    /// Write a reference static field
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] or [`KernelError::UnknownField`].
    pub fn set_static_ref(&mut self, class: ClassId, name: &str, value: ObjRef) -> Result<(), KernelError> {
        let slot = self.static_field(class, name)?;
        if let Some(s) = self.statics.get_mut(class) {
            s.fields_mut().set_ref(slot, value);
        }
        Ok(())
    }

    // ─── Thread Lifecycle ───────────────────────────────────────────────────

    /// Create a thread (state `New`) together with its thread object
    ///
    /// The new thread inherits priority and daemon status from `creator`.
    pub fn create_thread(
        &mut self,
        name: impl Into<String>,
        creator: Option<ThreadId>,
        site: Option<CreationSite>,
    ) -> ThreadId {
        let gid = self.new_global_id(creator, site);
        let thread_class = self.classes.register(
            ClassDescriptor::builder(THREAD_CLASS)
                .field("priority", ValueKind::Int)
                .build(),
        );
        let desc = self.classes.get(thread_class);
        let thread_object = self.heap.allocate(&desc, creator, gid);
        self.observers.object_created(creator, thread_object);

        let id = self.threads.next_id();
        let mut info = ThreadInfo::new(id, gid, name, thread_object);
        if let Some(parent) = creator.map(|p| self.threads.get(p)) {
            info.set_priority(parent.priority());
            info.set_daemon(parent.is_daemon());
        }
        if let Some((slot, _)) = desc.instance_layout().lookup("priority") {
            self.heap.get_mut(thread_object).fields_mut().set_int(slot, info.priority());
        }
        self.threads.add(info)
    }

    /// Start `thread` executing `frame`
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalThreadState`] unless the thread is `New`.
    pub fn start_thread(&mut self, thread: ThreadId, frame: StackFrame) -> Result<(), KernelError> {
        let state = self.threads.get(thread).state();
        if state != ThreadState::New {
            return Err(KernelError::IllegalThreadState { thread, state });
        }
        let method = frame.method();
        let info = self.threads.get_mut(thread);
        info.push_frame(frame);
        info.set_state(ThreadState::Running);

        self.observers.thread_started(thread);
        self.observers.method_entered(thread, method);
        Ok(())
    }

    /// Push `frame` onto a live thread's stack
    ///
    /// # Errors
    ///
    /// [`KernelError::ThreadNotAlive`] if the thread is not alive.
    pub fn enter_method(&mut self, thread: ThreadId, frame: StackFrame) -> Result<(), KernelError> {
        let info = self.threads.get_mut(thread);
        if !info.is_alive() {
            return Err(KernelError::ThreadNotAlive(thread));
        }
        let method = frame.method();
        info.push_frame(frame);
        self.observers.method_entered(thread, method);
        Ok(())
    }

    /// Pop the current frame of `thread`, `None` if its stack is empty
    pub fn exit_method(&mut self, thread: ThreadId) -> Option<StackFrame> {
        let frame = self.threads.get_mut(thread).pop_frame()?;
        self.observers.method_exited(thread, frame.method());
        Some(frame)
    }

    /// Report that `thread` executed the instruction at its current pc
    pub fn instruction_executed(&mut self, thread: ThreadId) {
        let Some(frame) = self.threads.get(thread).top_frame() else {
            return;
        };
        let (method, pc) = (frame.method(), frame.pc().unwrap_or_default());
        self.observers.instruction_executed(thread, method, pc);
    }

    /// Terminate `thread`
    ///
    /// Held monitors are released, and threads waiting on the thread object
    /// (joiners) are woken.
    ///
    /// # Errors
    ///
    /// [`KernelError::ThreadNotAlive`] if the thread never started or
    /// already terminated.
    pub fn terminate_thread(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        let info = self.threads.get(thread);
        if !info.is_alive() {
            return Err(KernelError::ThreadNotAlive(thread));
        }
        let held = info.locked_objects().to_vec();
        let thread_object = info.thread_object();

        for &obj in &held {
            self.heap.get_mut(obj).monitor_mut().release_all();
            self.wake_lock_requesters(obj);
            self.observers.object_unlocked(thread, obj);
        }

        let info = self.threads.get_mut(thread);
        info.clear_frames();
        info.set_lock_object(None);
        info.set_wait_lock_count(0);
        info.set_state(ThreadState::Terminated);
        for obj in held {
            info.remove_locked_object(obj);
        }

        let joiners = self.heap.get(thread_object).monitor().waiters().to_vec();
        for joiner in joiners {
            self.heap.get_mut(thread_object).monitor_mut().remove_waiter(joiner);
            self.heap.get_mut(thread_object).monitor_mut().add_lock_request(joiner);
            self.threads.get_mut(joiner).set_state(ThreadState::Unblocked);
            self.observers.thread_notified(joiner);
        }

        if self.atomic.owner == Some(thread) {
            self.atomic = AtomicSection::default();
            self.atomic_epoch += 1;
        }
        self.observers.thread_terminated(thread);
        Ok(())
    }

    /// Enter `Thread.sleep()`
    pub fn sleep(&mut self, thread: ThreadId) {
        self.threads.get_mut(thread).set_state(ThreadState::Sleeping);
    }

    /// Return from `Thread.sleep()`
    pub fn end_sleep(&mut self, thread: ThreadId) {
        let info = self.threads.get_mut(thread);
        if info.state() == ThreadState::Sleeping {
            info.set_state(ThreadState::Running);
        }
    }

    /// Suspend `thread`; suspended threads are never runnable
    pub fn suspend(&mut self, thread: ThreadId) {
        self.threads.get_mut(thread).set_suspended(true);
    }

    /// Resume a suspended thread
    pub fn resume(&mut self, thread: ThreadId) {
        self.threads.get_mut(thread).set_suspended(false);
    }

    // ─── Atomic Sections ────────────────────────────────────────────────────

    /// Enter (or nest) an atomic section on `thread`
    pub fn begin_atomic(&mut self, thread: ThreadId) {
        match self.atomic.owner {
            Some(owner) if owner != thread => {
                warn!(%owner, %thread, "atomic section taken over by another thread");
                self.atomic = AtomicSection {
                    owner: Some(thread),
                    depth: 1,
                    blocked_in_atomic: self.atomic.blocked_in_atomic,
                };
            }
            _ => {
                self.atomic.owner = Some(thread);
                self.atomic.depth += 1;
            }
        }
        self.atomic_epoch += 1;
    }

    /// Leave one level of the atomic section
    ///
    /// # Errors
    ///
    /// [`KernelError::NotInAtomicSection`] if `thread` does not own it.
    pub fn end_atomic(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        if self.atomic.owner != Some(thread) {
            return Err(KernelError::NotInAtomicSection(thread));
        }
        self.atomic.depth = self.atomic.depth.saturating_sub(1);
        if self.atomic.depth == 0 {
            self.atomic.owner = None;
        }
        self.atomic_epoch += 1;
        Ok(())
    }

    /// Whether any thread is inside an atomic section
    pub const fn is_atomic(&self) -> bool {
        self.atomic.owner.is_some()
    }

    /// Whether `thread` is inside an atomic section
    pub fn is_atomic_for(&self, thread: ThreadId) -> bool {
        self.atomic.owner == Some(thread)
    }

    /// Record that the atomic owner blocked inside its section
    pub fn set_blocked_in_atomic(&mut self, thread: ThreadId) {
        if !self.atomic.blocked_in_atomic {
            warn!(%thread, "thread blocked inside atomic section");
            self.atomic.blocked_in_atomic = true;
            self.atomic_epoch += 1;
        }
    }

    /// Whether a thread blocked inside an atomic section on this path
    pub const fn is_blocked_in_atomic(&self) -> bool {
        self.atomic.blocked_in_atomic
    }

    // ─── Global Conditions ──────────────────────────────────────────────────

    /// No thread can run, yet a non-daemon thread is still alive
    pub fn is_deadlocked(&self) -> bool {
        self.threads.is_deadlocked()
    }

    /// No non-daemon thread is alive
    pub fn is_terminated(&self) -> bool {
        !self.threads.iter().any(|t| t.is_alive() && !t.is_daemon())
    }

    /// Reclaim unreachable objects and refresh reachability attributes
    pub fn gc(&mut self) -> GcStats {
        let mut roots = GcRoots::default();
        self.threads.mark_roots(&mut roots.threads);
        self.statics.mark_roots(&mut roots.statics);
        self.heap.gc(&roots, &mut self.observers)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builder for [`KernelState`]
///
/// ```rust
/// use krepis_mc::domain::kernel::KernelState;
/// use krepis_mc::domain::heap::ClassRegistry;
///
/// let ks = KernelState::builder()
///     .classes(ClassRegistry::new())
///     .max_live_objects(Some(10_000))
///     .build();
/// assert!(ks.heap().is_empty());
/// ```
#[derive(Default)]
pub struct KernelStateBuilder {
    classes: Option<ClassRegistry>,
    id_pool: Option<IdPool>,
    max_live_objects: Option<usize>,
    observers: ObserverSet,
}

impl KernelStateBuilder {
    /// Defaults: fresh registry, fresh id pool, unbounded heap, no observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing class registry
    pub fn classes(mut self, classes: ClassRegistry) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Share an existing id pool
    pub fn id_pool(mut self, pool: IdPool) -> Self {
        self.id_pool = Some(pool);
        self
    }

    /// Raise out-of-memory above `max` live objects
    pub fn max_live_objects(mut self, max: Option<usize>) -> Self {
        self.max_live_objects = max;
        self
    }

    /// Apply the heap section of a checker configuration
    pub fn config(self, config: &CheckerConfig) -> Self {
        self.max_live_objects(config.heap.max_live_objects)
    }

    /// Register an observer
    pub fn observer(mut self, observer: Box<dyn VmObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Build the kernel state
    pub fn build(self) -> KernelState {
        KernelState {
            classes: self.classes.unwrap_or_else(ClassRegistry::new),
            heap: Heap::with_limit(self.max_live_objects),
            statics: StaticArea::new(),
            threads: ThreadList::new(),
            ids: GlobalIdManager::with_pool(self.id_pool.unwrap_or_default()),
            atomic: AtomicSection::default(),
            atomic_epoch: 0,
            tracker_slot: Arc::new(AtomicBool::new(false)),
            observers: self.observers,
        }
    }
}
