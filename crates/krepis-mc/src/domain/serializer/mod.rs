//! State Serializer - canonical encodings and fingerprints
//!
//! # Overview
//!
//! Two program states that differ only in heap slot assignment must produce
//! the same encoding. The serializer therefore never writes an [`ObjRef`];
//! every reference is replaced by the [`GlobalId`](crate::domain::identity::GlobalId)
//! of its target, and heap objects are visited breadth-first from the roots
//! rather than in slot order.
//!
//! # Encoding
//!
//! ```text
//! ┌──────────────────┬──────────────┬──────────────┬────────────────┬──────────────┐
//! │ thread stacks    │ statics      │ heap (BFS)   │ thread states  │ oom, atomic  │
//! │ per thread:      │ count, then  │ per element: │ per thread:    │              │
//! │  thread object,  │ per class:   │  class,      │  gid, state,   │              │
//! │  frames(method,  │  id, status, │  [length],   │  flags, depth, │              │
//! │  pc, n, slots)   │  class obj,  │  values      │  lock object,  │              │
//! │                  │  fields      │              │  locked objs   │              │
//! └──────────────────┴──────────────┴──────────────┴────────────────┴──────────────┘
//! ```
//!
//! References are written as their target's global id, null as `-1`. A
//! reference is queued for the heap section the first time it is written,
//! so the BFS order is fixed by the root order.
//!
//! # Caching
//!
//! [`FilteringSerializer`] holds the kernel's exclusive incremental tracker
//! and recomputes only when an epoch moved. After a restore the driver can
//! [`prime`](StateSerializer::prime) it with the fingerprint it stored next
//! to the memento.

mod fingerprint;
mod table;

pub use fingerprint::{fp64_extend_byte, fp64_extend_i32, fp64_of, FP64_INIT};
pub use table::{
    state_table_from_name, ExactStateTable, HashedStateTable, StateTable, Visit, STATE_TABLE_NAMES,
};

use crate::domain::heap::{ElementInfo, ElementKind, Fields, ObjRef};
use crate::domain::kernel::{IncrementalTracker, KernelState};
use crate::error::KernelError;
use bit_set::BitSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Encoding of `null`
const NULL_SLOT: i32 = -1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storing Data
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical encoding of one program state plus its FP64 fingerprint
#[derive(Clone, PartialEq, Eq)]
pub struct StoringData {
    data: Arc<[i32]>,
    hash: u64,
}

impl StoringData {
    /// Wrap an encoding and fingerprint it
    pub fn new(data: Vec<i32>) -> Self {
        let hash = fp64_of(&data);
        Self {
            data: data.into(),
            hash,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_hash(data: Vec<i32>, hash: u64) -> Self {
        Self {
            data: data.into(),
            hash,
        }
    }

    /// Encoded stream
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub(crate) const fn data_arc(&self) -> &Arc<[i32]> {
        &self.data
    }

    /// 64-bit fingerprint
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Stream length in `i32` words
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for an empty stream
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for StoringData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoringData")
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("len", &self.data.len())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serializer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Producer of canonical state fingerprints
pub trait StateSerializer {
    /// Fingerprint of the current state of `ks`
    fn fingerprint(&mut self, ks: &KernelState) -> StoringData;

    /// Declare `data` to be the fingerprint of the current state of `ks`,
    /// typically right after restoring the memento it was stored with
    fn prime(&mut self, ks: &KernelState, data: StoringData);
}

/// Cached canonical serializer
#[derive(Debug)]
pub struct FilteringSerializer {
    tracker: IncrementalTracker,
    cached: Option<StoringData>,
    computed: u64,
}

impl FilteringSerializer {
    /// Attach to `ks`, claiming its incremental tracker
    ///
    /// # Errors
    ///
    /// [`KernelError::IncrementalTrackerConflict`] if another serializer is
    /// already attached.
    pub fn attach(ks: &KernelState) -> Result<Self, KernelError> {
        Ok(Self {
            tracker: ks.register_incremental_tracker()?,
            cached: None,
            computed: 0,
        })
    }

    /// Number of encodings actually computed (cache misses)
    pub const fn computed(&self) -> u64 {
        self.computed
    }
}

impl StateSerializer for FilteringSerializer {
    fn fingerprint(&mut self, ks: &KernelState) -> StoringData {
        let changed = self.tracker.poll(ks);
        match &self.cached {
            Some(data) if !changed => data.clone(),
            _ => {
                let data = StoringData::new(encode(ks));
                self.computed += 1;
                trace!(hash = data.hash(), len = data.len(), "state encoded");
                self.cached = Some(data.clone());
                data
            }
        }
    }

    fn prime(&mut self, ks: &KernelState, data: StoringData) {
        self.tracker.sync(ks);
        self.cached = Some(data);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Encoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical encoding of the current state of `ks`, without caching
pub fn encode(ks: &KernelState) -> Vec<i32> {
    let mut enc = Encoder {
        ks,
        out: Vec::with_capacity(256),
        queue: VecDeque::new(),
        queued: BitSet::new(),
    };
    enc.thread_stacks();
    enc.statics();
    enc.heap();
    enc.thread_states();
    enc.globals();
    enc.out
}

struct Encoder<'a> {
    ks: &'a KernelState,
    out: Vec<i32>,
    queue: VecDeque<ObjRef>,
    queued: BitSet,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn len_slot(n: usize) -> i32 {
    n as i32
}

impl Encoder<'_> {
    /// Write a reference as its target's global id; dangling slots count
    /// as null
    fn reference(&mut self, r: ObjRef) {
        let Some(target) = self.ks.heap().try_get(r) else {
            self.out.push(NULL_SLOT);
            return;
        };
        self.out.push(target.global_id().as_slot());
        if self.queued.insert(r.index()) {
            self.queue.push_back(r);
        }
    }

    fn fields(&mut self, fields: &Fields) {
        for (i, v) in fields.values().iter().enumerate() {
            if fields.is_reference(i) {
                self.reference(ObjRef::from_slot(*v));
            } else {
                self.out.push(*v);
            }
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn thread_stacks(&mut self) {
        let ks = self.ks;
        for t in ks.threads().iter() {
            self.reference(t.thread_object());
            self.out.push(len_slot(t.stack_depth()));
            for frame in t.frames() {
                self.out.push(frame.method().0 as i32);
                self.out.push(frame.pc().map_or(NULL_SLOT, |pc| pc as i32));
                self.out.push(len_slot(frame.slots().len()));
                for (i, v) in frame.slots().iter().enumerate() {
                    if frame.is_reference(i) {
                        self.reference(ObjRef::from_slot(*v));
                    } else {
                        self.out.push(*v);
                    }
                }
            }
        }
    }

    fn statics(&mut self) {
        let ks = self.ks;
        self.out.push(len_slot(ks.statics().len()));
        for slot in ks.statics().iter() {
            self.out.push(slot.class().as_slot());
            if let ElementKind::Static { status, class_object } = slot.kind() {
                self.out.push(status.code());
                self.reference(*class_object);
            }
            self.fields(slot.fields());
        }
    }

    fn heap(&mut self) {
        let ks = self.ks;
        while let Some(r) = self.queue.pop_front() {
            let element: &ElementInfo = ks.heap().get(r);
            self.out.push(element.class().as_slot());
            if let Some(length) = element.array_length() {
                self.out.push(len_slot(length));
            }
            self.fields(element.fields());
        }
    }

    fn thread_states(&mut self) {
        let ks = self.ks;
        for t in ks.threads().iter() {
            self.out.push(t.global_id().as_slot());
            self.out.push(t.state().ordinal());
            self.out.push(
                i32::from(t.is_interrupted())
                    | (i32::from(t.is_suspended()) << 1)
                    | (i32::from(t.has_permit()) << 2),
            );
            self.out.push(len_slot(t.stack_depth()));
            let lock = t.lock_object().map_or(NULL_SLOT, |o| self.gid_or_null(o));
            self.out.push(lock);
            // a lock set, acquisition order is not state
            let mut held: Vec<i32> = t.locked_objects().iter().map(|&o| self.gid_or_null(o)).collect();
            held.sort_unstable();
            self.out.push(len_slot(held.len()));
            self.out.extend(held);
        }
    }

    fn globals(&mut self) {
        let ks = self.ks;
        self.out.push(i32::from(ks.heap().is_out_of_memory()));
        let owner = ks.atomic().owner().map_or(NULL_SLOT, |t| ks.threads().get(t).global_id().as_slot());
        self.out.push(owner);
    }

    fn gid_or_null(&self, r: ObjRef) -> i32 {
        self.ks.heap().try_get(r).map_or(NULL_SLOT, |e| e.global_id().as_slot())
    }
}

#[cfg(test)]
mod tests;
