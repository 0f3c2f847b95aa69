//! Scheduler - turns scheduling-relevant operations into choice generators
//!
//! # Overview
//!
//! The program under test calls one `create_*` method per operation, after
//! applying the operation's effect to the kernel state (so a failed
//! `lock()` has already marked the thread `Blocked`). The scheduler answers
//! with a [`ChoiceGenerator`] or `None` for movers, which run on without
//! branching.
//!
//! # Rules
//!
//! ```text
//! candidates = policy.filter(runnable threads)
//!
//! runnable decision ─┬─ |candidates| > 1            -> generator
//!                    ├─ |candidates| = 1 && break_single_choice -> generator
//!                    └─ otherwise                   -> None
//!
//! blocking decision (blocked monitor enter, wait, park)
//!                    ─> generator over candidates, even inside an atomic
//!                       section (which records blocked-in-atomic)
//! ```
//!
//! Inside an atomic section of the running thread, every non-blocking
//! decision is suppressed.

mod policy;

pub use policy::{
    policy_from_config, InOrder, Priority, Randomized, RoundRobin, SchedulingPolicy, POLICY_NAMES,
};

use crate::config::{CheckerConfig, ThreadBreakConfig};
use crate::domain::choice::{ArrayAccess, ChoiceGenerator, ChoiceKind, ChoicePath};
use crate::domain::heap::ObjRef;
use crate::domain::kernel::KernelState;
use crate::domain::threads::ThreadId;
use crate::error::ConfigError;
use tracing::trace;

/// Choice-generator factory
#[derive(Debug)]
pub struct Scheduler {
    breaks: ThreadBreakConfig,
    break_single_choice: bool,
    policy: Box<dyn SchedulingPolicy>,
}

impl Scheduler {
    /// Create a scheduler with the configured policy
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownPolicy`] if `scheduler.policy` does not resolve.
    pub fn new(config: &CheckerConfig) -> Result<Self, ConfigError> {
        let policy = policy_from_config(&config.scheduler)?;
        Ok(Self::with_policy(config, policy))
    }

    /// Create a scheduler with a custom policy
    pub fn with_policy(config: &CheckerConfig, policy: Box<dyn SchedulingPolicy>) -> Self {
        Self {
            breaks: config.threads,
            break_single_choice: config.break_single_choice,
            policy,
        }
    }

    /// Active policy
    pub fn policy(&self) -> &dyn SchedulingPolicy {
        self.policy.as_ref()
    }

    // ─── Candidate Computation ──────────────────────────────────────────────

    fn runnables(&self, ks: &KernelState, current: Option<ThreadId>) -> Vec<ThreadId> {
        self.policy.filter(ks, current, ks.threads().runnable_threads())
    }

    fn runnables_if_choices(&self, ks: &KernelState, current: Option<ThreadId>) -> Option<Vec<ThreadId>> {
        let n = ks.threads().runnable_count();
        if n > 1 || (n == 1 && self.break_single_choice) {
            Some(self.runnables(ks, current)).filter(|c| !c.is_empty())
        } else {
            None
        }
    }

    fn register(ks: &mut KernelState, cg: ChoiceGenerator) -> Option<ChoiceGenerator> {
        if cg.total() == 0 {
            return None;
        }
        trace!(kind = cg.kind().tag(), choices = cg.total(), creator = ?cg.creator(), "choice generator created");
        ks.observers_mut().choice_generator_registered(&cg);
        Some(cg)
    }

    fn runnable_cg(&self, ks: &mut KernelState, kind: ChoiceKind, thread: ThreadId) -> Option<ChoiceGenerator> {
        let choices = self.runnables_if_choices(ks, Some(thread))?;
        Self::register(ks, ChoiceGenerator::new(kind, choices, Some(thread)))
    }

    fn blocking_cg(&self, ks: &mut KernelState, kind: ChoiceKind, thread: ThreadId) -> Option<ChoiceGenerator> {
        if ks.is_atomic_for(thread) {
            ks.set_blocked_in_atomic(thread);
        }
        let choices = self.runnables(ks, Some(thread));
        Self::register(ks, ChoiceGenerator::new(kind, choices, Some(thread)))
    }

    fn monitor_enter_cg(&self, ks: &mut KernelState, kind: ChoiceKind, thread: ThreadId) -> Option<ChoiceGenerator> {
        if ks.threads().get(thread).is_blocked() {
            self.blocking_cg(ks, kind, thread)
        } else if ks.is_atomic_for(thread) {
            None
        } else {
            self.runnable_cg(ks, kind, thread)
        }
    }

    fn unless_atomic(&self, ks: &mut KernelState, kind: ChoiceKind, thread: ThreadId) -> Option<ChoiceGenerator> {
        if ks.is_atomic_for(thread) {
            None
        } else {
            self.runnable_cg(ks, kind, thread)
        }
    }

    // ─── Root ───────────────────────────────────────────────────────────────

    /// First decision of a search; branches even over a single thread
    pub fn create_root(&self, ks: &mut KernelState) -> Option<ChoiceGenerator> {
        let choices = self.runnables(ks, None);
        Self::register(ks, ChoiceGenerator::root(choices))
    }

    // ─── Monitors ───────────────────────────────────────────────────────────

    /// Entering a synchronized method on `object`
    pub fn create_sync_method_enter(
        &self,
        ks: &mut KernelState,
        thread: ThreadId,
        _object: ObjRef,
    ) -> Option<ChoiceGenerator> {
        self.monitor_enter_cg(ks, ChoiceKind::SyncMethodEnter, thread)
    }

    /// Leaving a synchronized method; a left mover, never a decision
    #[allow(clippy::unused_self)]
    pub fn create_sync_method_exit(
        &self,
        _ks: &mut KernelState,
        _thread: ThreadId,
        _object: ObjRef,
    ) -> Option<ChoiceGenerator> {
        None
    }

    /// `monitorenter` on `object`
    pub fn create_monitor_enter(&self, ks: &mut KernelState, thread: ThreadId, _object: ObjRef) -> Option<ChoiceGenerator> {
        self.monitor_enter_cg(ks, ChoiceKind::MonitorEnter, thread)
    }

    /// `monitorexit` on `object`; a left mover like
    /// [`create_sync_method_exit`](Self::create_sync_method_exit)
    #[allow(clippy::unused_self)]
    pub fn create_monitor_exit(&self, _ks: &mut KernelState, _thread: ThreadId, _object: ObjRef) -> Option<ChoiceGenerator> {
        None
    }

    /// `object.wait()`; always a decision, the waiter cannot continue
    pub fn create_wait(&self, ks: &mut KernelState, thread: ThreadId, _object: ObjRef) -> Option<ChoiceGenerator> {
        self.blocking_cg(ks, ChoiceKind::Wait, thread)
    }

    /// `object.notify()`: which waiter to wake
    ///
    /// With fewer than two waiters the outcome is fixed and no generator is
    /// created.
    pub fn create_notify(&self, ks: &mut KernelState, thread: ThreadId, object: ObjRef) -> Option<ChoiceGenerator> {
        if ks.is_atomic_for(thread) {
            return None;
        }
        let waiters = ks.heap().get(object).monitor().waiters().to_vec();
        if waiters.len() < 2 {
            return None;
        }
        Self::register(
            ks,
            ChoiceGenerator::new(ChoiceKind::Notify, waiters, Some(thread)).not_scheduling(),
        )
    }

    /// `object.notifyAll()`; a mover
    #[allow(clippy::unused_self)]
    pub fn create_notify_all(&self, _ks: &mut KernelState, _thread: ThreadId, _object: ObjRef) -> Option<ChoiceGenerator> {
        None
    }

    /// `LockSupport.park()`
    pub fn create_park(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        self.blocking_cg(ks, ChoiceKind::Park, thread)
    }

    /// `LockSupport.unpark(target)`
    pub fn create_unpark(&self, ks: &mut KernelState, thread: ThreadId, _target: ThreadId) -> Option<ChoiceGenerator> {
        self.unless_atomic(ks, ChoiceKind::Unpark, thread)
    }

    // ─── Shared Data ────────────────────────────────────────────────────────

    /// Access to a field of a shared object
    pub fn create_shared_field(&self, ks: &mut KernelState, thread: ThreadId, _object: ObjRef) -> Option<ChoiceGenerator> {
        self.unless_atomic(ks, ChoiceKind::SharedField, thread)
    }

    /// Access to an element of a shared array
    ///
    /// Only with `threads.break_array_access`. A run of generators created
    /// by the same thread on the same array already covers a repeated access
    /// of the same direction.
    pub fn create_shared_array(
        &self,
        ks: &mut KernelState,
        path: &ChoicePath,
        thread: ThreadId,
        access: ArrayAccess,
    ) -> Option<ChoiceGenerator> {
        if !self.breaks.break_array_access || ks.is_atomic_for(thread) {
            return None;
        }
        for cg in path.iter_newest_first() {
            let Some(prev) = cg.access().filter(|_| cg.creator() == Some(thread)) else {
                break;
            };
            if prev.array != access.array {
                break;
            }
            if prev.is_read == access.is_read {
                return None;
            }
        }
        let choices = self.runnables_if_choices(ks, Some(thread))?;
        Self::register(
            ks,
            ChoiceGenerator::new(ChoiceKind::SharedArray, choices, Some(thread)).with_access(access),
        )
    }

    // ─── Thread Operations ──────────────────────────────────────────────────

    /// `Thread.start()` of `_started`
    pub fn create_start(&self, ks: &mut KernelState, thread: ThreadId, _started: ThreadId) -> Option<ChoiceGenerator> {
        if !self.breaks.break_start {
            return None;
        }
        self.unless_atomic(ks, ChoiceKind::Start, thread)
    }

    /// `Thread.yield()`
    pub fn create_yield(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        if !self.breaks.break_yield {
            return None;
        }
        self.unless_atomic(ks, ChoiceKind::Yield, thread)
    }

    /// `Thread.sleep()`
    pub fn create_sleep(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        if !self.breaks.break_sleep {
            return None;
        }
        self.unless_atomic(ks, ChoiceKind::Sleep, thread)
    }

    /// `target.interrupt()`
    pub fn create_interrupt(&self, ks: &mut KernelState, thread: ThreadId, _target: ThreadId) -> Option<ChoiceGenerator> {
        self.unless_atomic(ks, ChoiceKind::Interrupt, thread)
    }

    /// Termination of `thread`; the remaining runnable threads compete
    /// even when only one is left
    pub fn create_terminate(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        if !ks.threads().has_any_alive_thread() {
            return None;
        }
        let rest = ks.threads().runnable_threads_without(thread);
        let choices = self.policy.filter(ks, Some(thread), rest);
        Self::register(ks, ChoiceGenerator::new(ChoiceKind::Terminate, choices, Some(thread)))
    }

    /// `Thread.suspend()`
    pub fn create_suspend(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        self.runnable_cg(ks, ChoiceKind::Suspend, thread)
    }

    /// `Thread.resume()`
    pub fn create_resume(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        self.runnable_cg(ks, ChoiceKind::Resume, thread)
    }

    /// `Thread.stop()`; a mover, the termination that follows branches
    #[allow(clippy::unused_self)]
    pub fn create_stop(&self, _ks: &mut KernelState, _thread: ThreadId) -> Option<ChoiceGenerator> {
        None
    }

    // ─── Atomic Sections ────────────────────────────────────────────────────

    /// Entering an atomic section; a mover
    #[allow(clippy::unused_self)]
    pub fn create_begin_atomic(&self, _ks: &mut KernelState, _thread: ThreadId) -> Option<ChoiceGenerator> {
        None
    }

    /// Leaving an atomic section
    pub fn create_end_atomic(&self, ks: &mut KernelState, thread: ThreadId) -> Option<ChoiceGenerator> {
        self.runnable_cg(ks, ChoiceKind::EndAtomic, thread)
    }
}
