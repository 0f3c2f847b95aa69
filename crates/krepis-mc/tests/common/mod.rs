//! Scripted programs for exploration tests
//!
//! Every thread runs a straight-line list of [`Op`]s. The pc of a thread is
//! the pc of its single frame, so the script itself carries no state and
//! replays from any restored memento.

#![allow(dead_code)]

use krepis_mc::domain::{
    ChoiceGenerator, ClassDescriptor, ClassId, KernelState, LockOutcome, MethodId, ObjRef, Program,
    StackFrame, StepContext, ThreadId, TransitionOutcome, ValueKind,
};
use krepis_mc::error::SearchError;
use tracing_subscriber::EnvFilter;

/// Route search logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Class holding shared counters and lock objects
pub const SHARED: &str = "Shared";
/// Static int fields of [`SHARED`]
pub const FIELDS: [&str; 3] = ["x", "y", "count"];
/// Number of lock objects referenced from [`SHARED`]
pub const LOCKS: usize = 2;

/// One scripted instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `Shared.<field> = value`
    Store(&'static str, i32),
    /// local 0 = `Shared.<field>`
    Load(&'static str),
    /// `Shared.<field> = local 0 + 1`
    StoreIncremented(&'static str),
    /// `monitorenter lock<i>`
    Lock(usize),
    /// `monitorexit lock<i>`
    Unlock(usize),
    /// `lock<i>.wait()`, reacquiring the monitor afterwards
    Wait(usize),
    /// `lock<i>.notify()`
    Notify(usize),
    /// `lock<i>.notifyAll()`
    NotifyAll(usize),
    /// `Thread.yield()`
    Yield,
    /// Enter an atomic section
    BeginAtomic,
    /// Leave the atomic section
    EndAtomic,
}

/// Straight-line threads over shared statics
#[derive(Debug, Clone, Default)]
pub struct Script {
    threads: Vec<Vec<Op>>,
    expect: Option<(&'static str, i32)>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread running `ops`
    pub fn thread(mut self, ops: impl Into<Vec<Op>>) -> Self {
        self.threads.push(ops.into());
        self
    }

    /// Require `Shared.<field> == value` once every thread terminated
    pub fn expect_final(mut self, field: &'static str, value: i32) -> Self {
        self.expect = Some((field, value));
        self
    }
}

pub fn shared_class(ks: &KernelState) -> ClassId {
    let mut desc = ClassDescriptor::builder(SHARED);
    for field in FIELDS {
        desc = desc.static_field(field, ValueKind::Int);
    }
    for i in 0..LOCKS {
        desc = desc.static_field(format!("lock{i}"), ValueKind::Reference);
    }
    ks.register_class(desc.build())
}

fn lock_ref(ks: &KernelState, i: usize) -> Result<ObjRef, SearchError> {
    Ok(ks.get_static_ref(shared_class(ks), &format!("lock{i}"))?)
}

fn program_error(thread: ThreadId, message: &str) -> SearchError {
    SearchError::Program {
        thread,
        message: message.to_owned(),
    }
}

fn pc(ks: &KernelState, thread: ThreadId) -> Result<usize, SearchError> {
    ks.threads()
        .get(thread)
        .top_frame()
        .and_then(StackFrame::pc)
        .map(|pc| pc as usize)
        .ok_or_else(|| program_error(thread, "no frame"))
}

fn frame<'a>(ks: &'a mut KernelState, thread: ThreadId) -> Result<&'a mut StackFrame, SearchError> {
    ks.threads_mut()
        .get_mut(thread)
        .top_frame_mut()
        .ok_or_else(|| program_error(thread, "no frame"))
}

impl Program for Script {
    fn init(&self, ks: &mut KernelState) -> Result<(), SearchError> {
        let shared = shared_class(ks);
        ks.load_class(shared);
        let lock_class = ks.register_class(ClassDescriptor::builder("Lock").build());
        for i in 0..LOCKS {
            let lock = ks.new_object(lock_class, None, None);
            ks.set_static_ref(shared, &format!("lock{i}"), lock)?;
        }
        for (i, _) in self.threads.iter().enumerate() {
            let t = ks.create_thread(format!("worker-{i}"), None, None);
            ks.start_thread(t, StackFrame::new(MethodId::new(i as u32), 1))?;
        }
        Ok(())
    }

    fn step(&self, cx: &mut StepContext<'_>, thread: ThreadId) -> Result<TransitionOutcome, SearchError> {
        let ops = &self.threads[thread.as_usize()];
        let shared = shared_class(cx.ks);
        let mut data_choice = cx.data_choice();
        let mut resumed = true;

        loop {
            let Some(&op) = ops.get(pc(cx.ks, thread)?) else {
                cx.ks.terminate_thread(thread)?;
                return Ok(cx.scheduler.create_terminate(cx.ks, thread).into());
            };
            let cg: Option<ChoiceGenerator> = match op {
                Op::Store(..) | Op::Load(_) | Op::StoreIncremented(_) => {
                    let cg = if resumed {
                        None
                    } else {
                        cx.scheduler.create_shared_field(cx.ks, thread, ObjRef::NULL)
                    };
                    if cg.is_none() {
                        match op {
                            Op::Store(field, value) => cx.ks.set_static_int(shared, field, value)?,
                            Op::Load(field) => {
                                let value = cx.ks.get_static_int(shared, field)?;
                                frame(cx.ks, thread)?.set_local(0, value);
                            }
                            Op::StoreIncremented(field) => {
                                let value = frame(cx.ks, thread)?.local(0);
                                cx.ks.set_static_int(shared, field, value + 1)?;
                            }
                            _ => unreachable!(),
                        }
                        frame(cx.ks, thread)?.advance_pc();
                    }
                    cg
                }
                Op::Lock(i) => {
                    let lock = lock_ref(cx.ks, i)?;
                    if cx.ks.lock(thread, lock) == LockOutcome::Acquired {
                        frame(cx.ks, thread)?.advance_pc();
                    }
                    cx.scheduler.create_monitor_enter(cx.ks, thread, lock)
                }
                Op::Unlock(i) => {
                    let lock = lock_ref(cx.ks, i)?;
                    cx.ks.unlock(thread, lock)?;
                    frame(cx.ks, thread)?.advance_pc();
                    cx.scheduler.create_monitor_exit(cx.ks, thread, lock)
                }
                Op::Wait(i) => {
                    let lock = lock_ref(cx.ks, i)?;
                    if cx.ks.heap().get(lock).monitor().owner() == Some(thread) {
                        cx.ks.wait(thread, lock)?;
                        cx.scheduler.create_wait(cx.ks, thread, lock)
                    } else {
                        if cx.ks.lock(thread, lock) == LockOutcome::Acquired {
                            frame(cx.ks, thread)?.advance_pc();
                        }
                        cx.scheduler.create_monitor_enter(cx.ks, thread, lock)
                    }
                }
                Op::Notify(i) => {
                    let lock = lock_ref(cx.ks, i)?;
                    if let Some(waiter) = data_choice.take() {
                        cx.ks.notify_thread(thread, lock, waiter)?;
                        frame(cx.ks, thread)?.advance_pc();
                        None
                    } else if let Some(cg) = cx.scheduler.create_notify(cx.ks, thread, lock) {
                        Some(cg)
                    } else {
                        cx.ks.notify(thread, lock)?;
                        frame(cx.ks, thread)?.advance_pc();
                        None
                    }
                }
                Op::NotifyAll(i) => {
                    let lock = lock_ref(cx.ks, i)?;
                    cx.ks.notify_all(thread, lock)?;
                    frame(cx.ks, thread)?.advance_pc();
                    cx.scheduler.create_notify_all(cx.ks, thread, lock)
                }
                Op::Yield => {
                    frame(cx.ks, thread)?.advance_pc();
                    cx.scheduler.create_yield(cx.ks, thread)
                }
                Op::BeginAtomic => {
                    cx.ks.begin_atomic(thread);
                    frame(cx.ks, thread)?.advance_pc();
                    cx.scheduler.create_begin_atomic(cx.ks, thread)
                }
                Op::EndAtomic => {
                    cx.ks.end_atomic(thread)?;
                    frame(cx.ks, thread)?.advance_pc();
                    cx.scheduler.create_end_atomic(cx.ks, thread)
                }
            };
            resumed = false;

            if let Some(cg) = cg {
                return Ok(TransitionOutcome::Branch(cg));
            }
            if !cx.ks.threads().get(thread).is_runnable() {
                return Ok(TransitionOutcome::Halt);
            }
        }
    }

    fn check(&self, ks: &KernelState) -> Option<String> {
        let (field, expected) = self.expect?;
        if ks.threads().has_any_alive_thread() {
            return None;
        }
        let actual = ks.get_static_int(ks.classes().lookup(SHARED)?, field).ok()?;
        (actual != expected).then(|| format!("{field} == {actual}, expected {expected}"))
    }
}
