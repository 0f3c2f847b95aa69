//! Thread Types
//!
//! Identifiers and lifecycle states of modeled threads. A modeled thread
//! never blocks the host: every state here is plain data inspected by the
//! scheduler and the driver.

use std::fmt;

/// Modeled thread identifier (index into the thread list)
///
/// Thread ids are path-local: the same logical thread may receive different
/// ids on different interleavings. Anything that must be canonical uses the
/// thread's [`GlobalId`](crate::domain::identity::GlobalId) instead.
///
/// # Example
///
/// ```rust
/// use krepis_mc::domain::threads::ThreadId;
///
/// let main = ThreadId::new(0);
/// assert_eq!(main.as_usize(), 0);
/// assert_eq!(main.to_string(), "Thread(0)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

impl ThreadId {
    /// Create a new ThreadId
    #[inline(always)]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw numeric ID
    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Lifecycle state of a modeled thread
///
/// # State Transitions
///
/// ```text
/// NEW ──start──> RUNNING ──monitor busy──> BLOCKED ──unlock──> UNBLOCKED
///                  │  ↑                                           │
///                  │  └───────────────── reacquire ───────────────┘
///                  ├──wait──> WAITING ──notify──> NOTIFIED ──unlock──> UNBLOCKED
///                  ├──park──> PARKED ──unpark──> RUNNING
///                  ├──sleep─> SLEEPING
///                  └──exit──> TERMINATED
/// ```
///
/// The discriminants are the ordinals written into state fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadState {
    /// Created, not started
    New = 0,
    /// Executing or ready to execute
    Running = 1,
    /// Waiting to enter a monitor
    Blocked = 2,
    /// Monitor became available, needs to re-acquire
    Unblocked = 3,
    /// In `wait()` without timeout
    Waiting = 4,
    /// In `wait(timeout)`
    TimedWaiting = 5,
    /// Notified, still needs the monitor back
    Notified = 6,
    /// Interrupted out of a wait
    Interrupted = 7,
    /// Wait timed out, needs the monitor back
    TimedOut = 8,
    /// Parked
    Parked = 9,
    /// Sleeping (time is not modeled, so this is runnable)
    Sleeping = 10,
    /// Finished
    Terminated = 11,
}

impl ThreadState {
    /// Ordinal used in canonical encodings
    #[inline(always)]
    pub const fn ordinal(self) -> i32 {
        self as i32
    }

    /// Whether a thread in this state may be scheduled
    #[inline]
    pub const fn is_runnable(self) -> bool {
        matches!(
            self,
            Self::Running | Self::Unblocked | Self::Sleeping | Self::TimedOut
        )
    }

    /// Started and not terminated
    #[inline]
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::New | Self::Terminated)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Running => "RUNNING",
            Self::Blocked => "BLOCKED",
            Self::Unblocked => "UNBLOCKED",
            Self::Waiting => "WAITING",
            Self::TimedWaiting => "TIMEOUT_WAITING",
            Self::Notified => "NOTIFIED",
            Self::Interrupted => "INTERRUPTED",
            Self::TimedOut => "TIMEDOUT",
            Self::Parked => "PARKED",
            Self::Sleeping => "SLEEPING",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
