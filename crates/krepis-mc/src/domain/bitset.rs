//! Thread Reach Masks
//!
//! A zero-allocation bitset backed by a single `u64`, used by the GC to track
//! which roots reach a heap element. Bits `0..=61` stand for modeled threads,
//! bit 62 marks "reached from a pin-down" and bit 63 marks "reached from a
//! static field".
//!
//! ```text
//! bit:   63      62      61 ........ 1 0
//!        STATIC  PINNED  thread ids ....
//! ```
//!
//! Threads whose id does not fit are folded into the STATIC bit, which makes
//! anything they reach conservatively shared.

use super::threads::ThreadId;
use std::fmt;

/// Number of thread bits in a [`ThreadMask`]
pub const MASK_THREAD_BITS: usize = 62;

const PINNED_BIT: u64 = 1 << 62;
const STATIC_BIT: u64 = 1 << 63;
const THREAD_BITS: u64 = !(PINNED_BIT | STATIC_BIT);

/// Set of roots (threads, statics, pin-downs) that reach an element
#[derive(Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct ThreadMask {
    bits: u64,
}

impl ThreadMask {
    /// Empty mask (unreached)
    pub const EMPTY: Self = Self { bits: 0 };

    /// Mask for objects reached from static fields
    pub const STATIC: Self = Self { bits: STATIC_BIT };

    /// Mask for objects reached from a pin-down
    pub const PINNED: Self = Self { bits: PINNED_BIT };

    /// Mask for objects reached from the stack of `thread`
    #[inline(always)]
    pub const fn thread(thread: ThreadId) -> Self {
        if thread.as_usize() < MASK_THREAD_BITS {
            Self { bits: 1u64 << thread.as_usize() }
        } else {
            Self::STATIC
        }
    }

    /// Union of two masks
    #[inline(always)]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self { bits: self.bits | other.bits }
    }

    /// Check whether no root reaches this element
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Check whether a static root reaches this element
    #[inline(always)]
    pub const fn has_static(self) -> bool {
        self.bits & STATIC_BIT != 0
    }

    /// Check whether the given thread reaches this element
    #[inline(always)]
    pub const fn contains_thread(self, thread: ThreadId) -> bool {
        thread.as_usize() < MASK_THREAD_BITS && self.bits & (1u64 << thread.as_usize()) != 0
    }

    /// Number of distinct threads reaching this element
    #[inline(always)]
    pub const fn thread_count(self) -> u32 {
        (self.bits & THREAD_BITS).count_ones()
    }

    /// The reaching thread, if exactly one thread (and no static) reaches
    /// this element
    #[inline]
    pub const fn single_thread(self) -> Option<ThreadId> {
        let threads = self.bits & THREAD_BITS;
        if self.has_static() || threads.count_ones() != 1 {
            None
        } else {
            Some(ThreadId::new(threads.trailing_zeros() as usize))
        }
    }
}

impl fmt::Debug for ThreadMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadMask({:#018x})", self.bits)
    }
}
