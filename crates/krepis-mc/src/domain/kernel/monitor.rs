//! Monitor and blocking operations
//!
//! ```text
//!            lock (free)                 unlock → free
//! Running ─────────────> owner   ─────────────────────────┐
//!    │ lock (taken)                                       │
//!    v                                                    v
//! Blocked ──────── monitor freed ──────────────> Unblocked ── lock ──> owner
//!                                                    ^
//! owner ── wait ──> Waiting ── notify ──> Notified ──┘ (once the notifier unlocks)
//!                      │
//!                      └── interrupt ──> Interrupted ──┘
//! ```
//!
//! Re-acquisition after `wait()` restores the saved entry count.

use super::KernelState;
use crate::domain::heap::ObjRef;
use crate::domain::threads::{ThreadId, ThreadState};
use crate::error::KernelError;

/// Result of a monitor-enter attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The thread now owns the monitor
    Acquired,
    /// The monitor is owned elsewhere; the thread is `Blocked`
    Blocked,
}

impl KernelState {
    fn check_owner(&self, thread: ThreadId, object: ObjRef) -> Result<(), KernelError> {
        if self.heap.get(object).monitor().owner() == Some(thread) {
            Ok(())
        } else {
            Err(KernelError::IllegalMonitorState { thread, object })
        }
    }

    /// Move threads waiting for the (now free) monitor of `object` to
    /// `Unblocked`
    pub(super) fn wake_lock_requesters(&mut self, object: ObjRef) {
        let requesters = self.heap.get(object).monitor().lock_requests().to_vec();
        for t in requesters {
            let info = self.threads.get_mut(t);
            if matches!(
                info.state(),
                ThreadState::Blocked | ThreadState::Notified | ThreadState::Interrupted
            ) {
                info.set_state(ThreadState::Unblocked);
            }
        }
    }

    /// Enter the monitor of `object`
    pub fn lock(&mut self, thread: ThreadId, object: ObjRef) -> LockOutcome {
        if !self.heap.get(object).monitor().can_lock(thread) {
            self.heap.get_mut(object).monitor_mut().add_lock_request(thread);
            let info = self.threads.get_mut(thread);
            info.set_lock_object(Some(object));
            info.set_state(ThreadState::Blocked);
            self.observers.thread_blocked(thread, object);
            return LockOutcome::Blocked;
        }

        let info = self.threads.get_mut(thread);
        let count = match info.wait_lock_count() {
            0 => 1,
            saved => saved,
        };
        info.set_wait_lock_count(0);
        info.set_lock_object(None);
        info.add_locked_object(object);
        if !matches!(info.state(), ThreadState::Running | ThreadState::Sleeping) {
            info.set_state(ThreadState::Running);
        }
        self.heap.get_mut(object).monitor_mut().lock(thread, count);
        self.observers.object_locked(thread, object);
        LockOutcome::Acquired
    }

    /// Exit the monitor of `object` once; returns `true` when it became free
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn unlock(&mut self, thread: ThreadId, object: ObjRef) -> Result<bool, KernelError> {
        self.check_owner(thread, object)?;
        let freed = self.heap.get_mut(object).monitor_mut().unlock();
        if freed {
            self.threads.get_mut(thread).remove_locked_object(object);
            self.wake_lock_requesters(object);
        }
        self.observers.object_unlocked(thread, object);
        Ok(freed)
    }

    /// `object.wait()`: release the monitor completely and wait
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn wait(&mut self, thread: ThreadId, object: ObjRef) -> Result<(), KernelError> {
        self.enter_wait(thread, object, ThreadState::Waiting)
    }

    /// `object.wait(timeout)`
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn timed_wait(&mut self, thread: ThreadId, object: ObjRef) -> Result<(), KernelError> {
        self.enter_wait(thread, object, ThreadState::TimedWaiting)
    }

    fn enter_wait(&mut self, thread: ThreadId, object: ObjRef, state: ThreadState) -> Result<(), KernelError> {
        self.check_owner(thread, object)?;
        let monitor = self.heap.get_mut(object).monitor_mut();
        let count = monitor.release_all();
        monitor.add_waiter(thread);

        let info = self.threads.get_mut(thread);
        info.set_wait_lock_count(count);
        info.remove_locked_object(object);
        info.set_lock_object(Some(object));
        info.set_state(state);

        self.wake_lock_requesters(object);
        self.observers.object_unlocked(thread, object);
        self.observers.thread_waiting(thread, object);
        Ok(())
    }

    /// Let a timed wait of `thread` expire; the thread becomes runnable and
    /// must re-acquire its monitor
    pub fn time_out(&mut self, thread: ThreadId) -> bool {
        let info = self.threads.get(thread);
        let Some(object) = info.lock_object() else {
            return false;
        };
        if info.state() != ThreadState::TimedWaiting {
            return false;
        }
        let monitor = self.heap.get_mut(object).monitor_mut();
        monitor.remove_waiter(thread);
        monitor.add_lock_request(thread);
        self.threads.get_mut(thread).set_state(ThreadState::TimedOut);
        true
    }

    /// `object.notify()` choosing `waiter`; returns whether it was waiting
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn notify_thread(&mut self, thread: ThreadId, object: ObjRef, waiter: ThreadId) -> Result<bool, KernelError> {
        self.check_owner(thread, object)?;
        let monitor = self.heap.get_mut(object).monitor_mut();
        if !monitor.remove_waiter(waiter) {
            return Ok(false);
        }
        monitor.add_lock_request(waiter);
        self.threads.get_mut(waiter).set_state(ThreadState::Notified);
        self.observers.thread_notified(waiter);
        Ok(true)
    }

    /// `object.notify()` choosing the longest waiter
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn notify(&mut self, thread: ThreadId, object: ObjRef) -> Result<Option<ThreadId>, KernelError> {
        self.check_owner(thread, object)?;
        let Some(waiter) = self.heap.get(object).monitor().waiters().first().copied() else {
            return Ok(None);
        };
        self.notify_thread(thread, object, waiter)?;
        Ok(Some(waiter))
    }

    /// `object.notifyAll()`; returns the number of woken threads
    ///
    /// # Errors
    ///
    /// [`KernelError::IllegalMonitorState`] if `thread` is not the owner.
    pub fn notify_all(&mut self, thread: ThreadId, object: ObjRef) -> Result<usize, KernelError> {
        self.check_owner(thread, object)?;
        let waiters = self.heap.get(object).monitor().waiters().to_vec();
        for &waiter in &waiters {
            self.notify_thread(thread, object, waiter)?;
        }
        Ok(waiters.len())
    }

    /// Park `thread` unless a permit or an interrupt is pending
    ///
    /// A pending permit is consumed.
    pub fn park(&mut self, thread: ThreadId) {
        let info = self.threads.get_mut(thread);
        if info.has_permit() {
            info.set_permit(false);
            return;
        }
        if info.is_interrupted() {
            return;
        }
        info.set_state(ThreadState::Parked);
    }

    /// Unpark `thread`; returns whether it was parked
    ///
    /// A thread that is not parked keeps a single permit for its next
    /// [`park`](Self::park).
    pub fn unpark(&mut self, thread: ThreadId) -> bool {
        let info = self.threads.get_mut(thread);
        if info.state() == ThreadState::Parked {
            info.set_state(ThreadState::Running);
            true
        } else {
            if info.is_alive() {
                info.set_permit(true);
            }
            false
        }
    }

    /// Interrupt `thread`
    ///
    /// Waiting threads leave the wait set and must re-acquire their monitor;
    /// parked and sleeping threads resume directly.
    pub fn interrupt(&mut self, thread: ThreadId) {
        let info = self.threads.get_mut(thread);
        info.set_interrupted(true);
        match info.state() {
            ThreadState::Waiting | ThreadState::TimedWaiting => {
                let Some(object) = info.lock_object() else {
                    return;
                };
                let monitor = self.heap.get_mut(object).monitor_mut();
                monitor.remove_waiter(thread);
                monitor.add_lock_request(thread);
                let next = if monitor.owner().is_none() {
                    ThreadState::Unblocked
                } else {
                    ThreadState::Interrupted
                };
                self.threads.get_mut(thread).set_state(next);
            }
            ThreadState::Parked | ThreadState::Sleeping => info.set_state(ThreadState::Running),
            _ => {}
        }
    }
}
