//! Thread List - modeled threads and their call stacks
//!
//! # Architecture
//!
//! ```text
//! ThreadList
//!  └─ Vec<Arc<ThreadInfo>>     index == ThreadId
//!       ├─ state, priority, suspension
//!       ├─ frames: Vec<StackFrame>   (GC roots)
//!       └─ lock bookkeeping          (GC roots)
//! ```
//!
//! Each thread sits behind its own `Arc`, so a memento is a vector of
//! pointers and only threads that actually ran after a snapshot are cloned.

mod frame;
mod types;

pub use frame::StackFrame;
pub use types::{ThreadId, ThreadState};

use crate::domain::heap::ObjRef;
use crate::domain::identity::GlobalId;
use std::sync::Arc;

/// Default priority of modeled threads
pub const NORM_PRIORITY: i32 = 5;

/// One modeled thread
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    id: ThreadId,
    global_id: GlobalId,
    name: String,
    state: ThreadState,
    priority: i32,
    daemon: bool,
    suspended: bool,
    interrupted: bool,
    permit: bool,
    thread_object: ObjRef,
    frames: Vec<StackFrame>,
    lock_object: Option<ObjRef>,
    locked_objects: Vec<ObjRef>,
    wait_lock_count: u32,
}

impl ThreadInfo {
    /// Create a thread in state [`ThreadState::New`]
    pub fn new(id: ThreadId, global_id: GlobalId, name: impl Into<String>, thread_object: ObjRef) -> Self {
        Self {
            id,
            global_id,
            name: name.into(),
            state: ThreadState::New,
            priority: NORM_PRIORITY,
            daemon: false,
            suspended: false,
            interrupted: false,
            permit: false,
            thread_object,
            frames: Vec::new(),
            lock_object: None,
            locked_objects: Vec::new(),
            wait_lock_count: 0,
        }
    }

    /// Path-local id
    pub const fn id(&self) -> ThreadId {
        self.id
    }

    /// Canonical id
    pub const fn global_id(&self) -> GlobalId {
        self.global_id
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub const fn state(&self) -> ThreadState {
        self.state
    }

    /// Change state
    pub fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Scheduling priority
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Change scheduling priority
    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Daemon flag
    pub const fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Set the daemon flag
    pub fn set_daemon(&mut self, daemon: bool) {
        self.daemon = daemon;
    }

    /// Suspension flag
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Set the suspension flag
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Pending interrupt flag
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Set the pending interrupt flag
    pub fn set_interrupted(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
    }

    /// Unpark permit, granted by an unpark that found the thread running
    pub const fn has_permit(&self) -> bool {
        self.permit
    }

    /// Grant or consume the unpark permit
    pub fn set_permit(&mut self, permit: bool) {
        self.permit = permit;
    }

    /// Heap object representing this thread
    pub const fn thread_object(&self) -> ObjRef {
        self.thread_object
    }

    /// Schedulable right now
    pub const fn is_runnable(&self) -> bool {
        !self.suspended && self.state.is_runnable()
    }

    /// Started and not terminated
    pub const fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Finished
    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// Waiting to enter a monitor
    pub fn is_blocked(&self) -> bool {
        self.state == ThreadState::Blocked
    }

    /// Frames, bottom first
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Current frame
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Current frame, mutable
    pub fn top_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    /// Enter a method
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Return from the current method
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Number of frames
    pub fn stack_depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop all frames
    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    /// Object whose monitor this thread is blocked or waiting on
    pub const fn lock_object(&self) -> Option<ObjRef> {
        self.lock_object
    }

    /// Set the object this thread is blocked or waiting on
    pub fn set_lock_object(&mut self, obj: Option<ObjRef>) {
        self.lock_object = obj;
    }

    /// Monitors currently held, in acquisition order
    pub fn locked_objects(&self) -> &[ObjRef] {
        &self.locked_objects
    }

    /// Record an acquired monitor
    pub fn add_locked_object(&mut self, obj: ObjRef) {
        if !self.locked_objects.contains(&obj) {
            self.locked_objects.push(obj);
        }
    }

    /// Forget a released monitor
    pub fn remove_locked_object(&mut self, obj: ObjRef) {
        self.locked_objects.retain(|o| *o != obj);
    }

    /// Monitor entry count saved by `wait()`
    pub const fn wait_lock_count(&self) -> u32 {
        self.wait_lock_count
    }

    /// Save the monitor entry count before waiting
    pub fn set_wait_lock_count(&mut self, count: u32) {
        self.wait_lock_count = count;
    }

    /// GC roots held by this thread
    pub fn references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        std::iter::once(self.thread_object)
            .chain(self.lock_object)
            .chain(self.locked_objects.iter().copied())
            .chain(self.frames.iter().flat_map(StackFrame::references))
            .filter(|r| !r.is_null())
    }
}

/// Restorable snapshot of a [`ThreadList`]
#[derive(Debug, Clone)]
pub struct ThreadListMemento {
    threads: Vec<Arc<ThreadInfo>>,
}

/// All modeled threads of one program state
#[derive(Debug, Clone, Default)]
pub struct ThreadList {
    threads: Vec<Arc<ThreadInfo>>,
    epoch: u64,
}

impl ThreadList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next added thread will receive
    pub fn next_id(&self) -> ThreadId {
        ThreadId::new(self.threads.len())
    }

    /// Add a thread; its id must equal [`next_id`](Self::next_id)
    ///
    /// # Panics
    ///
    /// Panics if the thread id does not match its list position.
    pub fn add(&mut self, info: ThreadInfo) -> ThreadId {
        let id = info.id();
        assert_eq!(id, self.next_id(), "thread id out of sequence");
        self.threads.push(Arc::new(info));
        self.epoch += 1;
        id
    }

    /// Look up a thread
    ///
    /// # Panics
    ///
    /// Panics on an unknown id; thread ids come from this list, so a miss is
    /// an engine bug.
    pub fn get(&self, id: ThreadId) -> &ThreadInfo {
        match self.threads.get(id.as_usize()) {
            Some(t) => t,
            None => panic!("unknown {id}"),
        }
    }

    /// Look up a thread without panicking
    pub fn try_get(&self, id: ThreadId) -> Option<&ThreadInfo> {
        self.threads.get(id.as_usize()).map(AsRef::as_ref)
    }

    /// Mutable access; clones the thread if a memento still shares it
    ///
    /// # Panics
    ///
    /// Panics on an unknown id.
    pub fn get_mut(&mut self, id: ThreadId) -> &mut ThreadInfo {
        self.epoch += 1;
        match self.threads.get_mut(id.as_usize()) {
            Some(t) => Arc::make_mut(t),
            None => panic!("unknown {id}"),
        }
    }

    /// Number of threads ever created on this path
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Check whether no thread exists
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// All threads in id order
    pub fn iter(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.iter().map(AsRef::as_ref)
    }

    /// Ids of runnable threads, in id order
    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.iter().filter(|t| t.is_runnable()).map(ThreadInfo::id).collect()
    }

    /// Runnable threads other than `excluded`
    pub fn runnable_threads_without(&self, excluded: ThreadId) -> Vec<ThreadId> {
        self.iter()
            .filter(|t| t.is_runnable() && t.id() != excluded)
            .map(ThreadInfo::id)
            .collect()
    }

    /// Number of runnable threads
    pub fn runnable_count(&self) -> usize {
        self.iter().filter(|t| t.is_runnable()).count()
    }

    /// Whether any thread is alive
    pub fn has_any_alive_thread(&self) -> bool {
        self.iter().any(ThreadInfo::is_alive)
    }

    /// No thread is runnable, yet some non-daemon thread is still alive
    pub fn is_deadlocked(&self) -> bool {
        self.runnable_count() == 0 && self.iter().any(|t| t.is_alive() && !t.is_daemon())
    }

    /// Collect `(thread, root)` pairs for every non-terminated thread
    pub fn mark_roots(&self, out: &mut Vec<(ThreadId, ObjRef)>) {
        for t in self.iter().filter(|t| !t.is_terminated()) {
            out.extend(t.references().map(|r| (t.id(), r)));
        }
    }

    /// Mutation epoch (monotonic, survives restores)
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Capture the list
    pub fn memento(&self) -> ThreadListMemento {
        ThreadListMemento {
            threads: self.threads.clone(),
        }
    }

    /// Reinstate a captured list
    pub fn restore(&mut self, memento: &ThreadListMemento) {
        self.threads.clone_from(&memento.threads);
        self.epoch += 1;
    }
}
