//! Element storage: one tagged type for objects, arrays and static slots
//!
//! # Layout
//!
//! ```text
//! ElementInfo
//!  ├─ kind: Object | Array { elem, length } | Static { status, class_object }
//!  ├─ fields: Fields   (flat i32 slots + reference mask)
//!  ├─ monitor          (owner, entry count, waiters, lock requests)
//!  ├─ sharedness       (ThreadLocal(t) | Shared)
//!  ├─ global_id, pin_down, flags, cached_refs
//! ```
//!
//! GC mark bits and changed bits are kept by the owning area as per-slot side
//! tables, so marking never forces a copy-on-write clone of an element.

use super::types::{ClassId, ObjRef, ValueKind};
use crate::domain::identity::GlobalId;
use crate::domain::threads::ThreadId;
use std::fmt;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fields
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which slots of a [`Fields`] block hold references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefMask {
    /// No reference slots (primitive arrays)
    None,
    /// Every slot is a reference (reference arrays)
    All,
    /// Per-slot mask shared with the class layout
    Mask(Arc<[bool]>),
}

/// Flattened field or element storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    values: Vec<i32>,
    refs: RefMask,
}

impl Fields {
    /// Storage for a named-field layout; reference slots start out null
    pub fn with_mask(mask: &Arc<[bool]>) -> Self {
        let values = mask.iter().map(|is_ref| if *is_ref { ObjRef::NULL.as_slot() } else { 0 }).collect();
        Self {
            values,
            refs: RefMask::Mask(Arc::clone(mask)),
        }
    }

    /// Storage for an array of `len` elements of `kind`
    pub fn array(kind: ValueKind, len: usize) -> Self {
        if kind.is_reference() {
            Self {
                values: vec![ObjRef::NULL.as_slot(); len],
                refs: RefMask::All,
            }
        } else {
            Self {
                values: vec![0; len * kind.width()],
                refs: RefMask::None,
            }
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for zero slots
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw slots
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Whether slot `idx` is a reference slot
    pub fn is_reference(&self, idx: usize) -> bool {
        match &self.refs {
            RefMask::None => false,
            RefMask::All => idx < self.values.len(),
            RefMask::Mask(mask) => mask.get(idx).copied().unwrap_or(false),
        }
    }

    /// Read an int-sized slot
    pub fn get_int(&self, idx: usize) -> i32 {
        self.values[idx]
    }

    /// Write an int-sized slot
    pub fn set_int(&mut self, idx: usize, value: i32) {
        self.values[idx] = value;
    }

    /// Read a two-slot long (high word first)
    pub fn get_long(&self, idx: usize) -> i64 {
        (i64::from(self.values[idx]) << 32) | i64::from(self.values[idx + 1] as u32)
    }

    /// Write a two-slot long (high word first)
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_long(&mut self, idx: usize, value: i64) {
        self.values[idx] = (value >> 32) as i32;
        self.values[idx + 1] = value as i32;
    }

    /// Read a reference slot
    pub fn get_ref(&self, idx: usize) -> ObjRef {
        ObjRef::from_slot(self.values[idx])
    }

    /// Write a reference slot
    pub fn set_ref(&mut self, idx: usize, value: ObjRef) {
        self.values[idx] = value.as_slot();
    }

    /// Non-null references held in reference slots, skipping the first
    /// `skip` slots
    pub fn references_from(&self, skip: usize) -> impl Iterator<Item = ObjRef> + '_ {
        self.values
            .iter()
            .enumerate()
            .skip(skip)
            .filter(|(i, _)| self.is_reference(*i))
            .map(|(_, v)| ObjRef::from_slot(*v))
            .filter(|r| !r.is_null())
    }

    /// All non-null references held in reference slots
    pub fn references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.references_from(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lock state attached to every element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Monitor {
    owner: Option<ThreadId>,
    count: u32,
    waiters: Vec<ThreadId>,
    lock_requests: Vec<ThreadId>,
}

impl Monitor {
    /// Current owner
    pub const fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Re-entrant entry count
    pub const fn lock_count(&self) -> u32 {
        self.count
    }

    /// Whether `thread` may enter without blocking
    pub fn can_lock(&self, thread: ThreadId) -> bool {
        self.owner.is_none_or(|o| o == thread)
    }

    /// Enter `count` times (re-entrant)
    pub fn lock(&mut self, thread: ThreadId, count: u32) {
        debug_assert!(self.can_lock(thread));
        self.owner = Some(thread);
        self.count += count;
        self.lock_requests.retain(|t| *t != thread);
    }

    /// Exit once, returning `true` if the monitor became free
    pub fn unlock(&mut self) -> bool {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.owner = None;
            true
        } else {
            false
        }
    }

    /// Release completely (for `wait()`), returning the previous count
    pub fn release_all(&mut self) -> u32 {
        let count = self.count;
        self.count = 0;
        self.owner = None;
        count
    }

    /// Threads in `wait()` on this monitor
    pub fn waiters(&self) -> &[ThreadId] {
        &self.waiters
    }

    /// Add a waiting thread
    pub fn add_waiter(&mut self, thread: ThreadId) {
        if !self.waiters.contains(&thread) {
            self.waiters.push(thread);
        }
    }

    /// Remove a waiting thread, returning whether it was waiting
    pub fn remove_waiter(&mut self, thread: ThreadId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|t| *t != thread);
        before != self.waiters.len()
    }

    /// Threads that need this monitor to proceed
    pub fn lock_requests(&self) -> &[ThreadId] {
        &self.lock_requests
    }

    /// Record a thread that needs this monitor
    pub fn add_lock_request(&mut self, thread: ThreadId) {
        if !self.lock_requests.contains(&thread) {
            self.lock_requests.push(thread);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Element
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which threads can reach an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharedness {
    /// Reached only from this thread's stack
    ThreadLocal(ThreadId),
    /// Reached from several threads or from a static field
    Shared,
}

/// Class initialization status of a static slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassInitStatus {
    /// `<clinit>` has not run
    Uninitialized,
    /// `<clinit>` is running on this thread
    InProgress(ThreadId),
    /// `<clinit>` completed
    Initialized,
}

impl ClassInitStatus {
    /// Position in the forward-only progression
    pub const fn rank(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::InProgress(_) => 1,
            Self::Initialized => 2,
        }
    }

    /// Value used in canonical encodings
    pub const fn code(self) -> i32 {
        match self {
            Self::Uninitialized => -1,
            Self::InProgress(_) => 1,
            Self::Initialized => 0,
        }
    }
}

impl fmt::Display for ClassInitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::InProgress(t) => write!(f, "initializing by {t}"),
            Self::Initialized => f.write_str("initialized"),
        }
    }
}

/// Variant-specific payload of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// Plain object with named fields
    Object,
    /// Array
    Array {
        /// Element kind
        elem: ValueKind,
        /// Element count
        length: usize,
    },
    /// Static storage of one class
    Static {
        /// Init status
        status: ClassInitStatus,
        /// Heap object representing the class
        class_object: ObjRef,
    },
}

/// Per-element attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementFlags(u8);

impl ElementFlags {
    /// Field 0 is a weak referent
    pub const WEAK_REFERENCE: Self = Self(1);
    /// Entry of the intern table
    pub const INTERNED: Self = Self(1 << 1);

    /// Check whether all bits of `other` are set
    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    #[inline(always)]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// One heap object, array or static slot
#[derive(Debug, Clone)]
pub struct ElementInfo {
    objref: ObjRef,
    global_id: GlobalId,
    class: ClassId,
    kind: ElementKind,
    fields: Fields,
    monitor: Monitor,
    sharedness: Sharedness,
    pin_down: u32,
    flags: ElementFlags,
    cached_refs: Vec<ObjRef>,
}

impl ElementInfo {
    /// Create an element
    pub fn new(
        objref: ObjRef,
        global_id: GlobalId,
        class: ClassId,
        kind: ElementKind,
        fields: Fields,
        creator: Option<ThreadId>,
    ) -> Self {
        Self {
            objref,
            global_id,
            class,
            kind,
            fields,
            monitor: Monitor::default(),
            sharedness: creator.map_or(Sharedness::Shared, Sharedness::ThreadLocal),
            pin_down: 0,
            flags: ElementFlags::default(),
            cached_refs: Vec::new(),
        }
    }

    /// Slot of this element in its area
    pub const fn objref(&self) -> ObjRef {
        self.objref
    }

    /// Canonical id
    pub const fn global_id(&self) -> GlobalId {
        self.global_id
    }

    /// Class
    pub const fn class(&self) -> ClassId {
        self.class
    }

    /// Variant payload
    pub const fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Variant payload, mutable
    pub fn kind_mut(&mut self) -> &mut ElementKind {
        &mut self.kind
    }

    /// Array length, `None` for non-arrays
    pub const fn array_length(&self) -> Option<usize> {
        match self.kind {
            ElementKind::Array { length, .. } => Some(length),
            _ => None,
        }
    }

    /// Field storage
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Field storage, mutable
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// Monitor
    pub const fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Monitor, mutable
    pub fn monitor_mut(&mut self) -> &mut Monitor {
        &mut self.monitor
    }

    /// Sharedness marker
    pub const fn sharedness(&self) -> Sharedness {
        self.sharedness
    }

    /// Reachable from more than one thread
    pub fn is_shared(&self) -> bool {
        self.sharedness == Sharedness::Shared
    }

    pub(crate) fn set_sharedness(&mut self, sharedness: Sharedness) {
        self.sharedness = sharedness;
    }

    /// Pinned objects survive GC regardless of reachability
    pub const fn is_pinned(&self) -> bool {
        self.pin_down > 0
    }

    pub(crate) fn inc_pin_down(&mut self) {
        self.pin_down += 1;
    }

    pub(crate) fn dec_pin_down(&mut self) -> u32 {
        self.pin_down = self.pin_down.saturating_sub(1);
        self.pin_down
    }

    /// Attribute bits
    pub const fn flags(&self) -> ElementFlags {
        self.flags
    }

    pub(crate) fn insert_flags(&mut self, flags: ElementFlags) {
        self.flags.insert(flags);
    }

    /// Whether field 0 is a weak referent
    pub const fn is_weak_reference(&self) -> bool {
        self.flags.contains(ElementFlags::WEAK_REFERENCE)
    }

    /// References cached outside the declared fields
    pub fn cached_refs(&self) -> &[ObjRef] {
        &self.cached_refs
    }

    /// Cache a reference outside the declared fields
    ///
    /// Cached references are not GC roots; they are scrubbed once their
    /// target is reclaimed.
    pub fn cache_ref(&mut self, target: ObjRef) {
        if !target.is_null() && !self.cached_refs.contains(&target) {
            self.cached_refs.push(target);
        }
    }

    pub(crate) fn retain_cached_refs(&mut self, mut keep: impl FnMut(ObjRef) -> bool) -> usize {
        let before = self.cached_refs.len();
        self.cached_refs.retain(|r| keep(*r));
        before - self.cached_refs.len()
    }

    /// References the GC follows: every reference slot, except field 0 of
    /// weak-reference holders
    pub fn traced_references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        let skip = usize::from(self.is_weak_reference());
        let class_object = match self.kind {
            ElementKind::Static { class_object, .. } if !class_object.is_null() => Some(class_object),
            _ => None,
        };
        self.fields.references_from(skip).chain(class_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(mask: &[bool]) -> ElementInfo {
        let mask: Arc<[bool]> = mask.to_vec().into();
        ElementInfo::new(
            ObjRef::new(0),
            GlobalId(0),
            ClassId(0),
            ElementKind::Object,
            Fields::with_mask(&mask),
            Some(ThreadId(0)),
        )
    }

    #[test]
    fn test_reference_slots_start_null() {
        let e = object(&[false, true]);
        assert_eq!(e.fields().get_int(0), 0);
        assert!(e.fields().get_ref(1).is_null());
        assert_eq!(e.traced_references().count(), 0);
    }

    #[test]
    fn test_long_round_trip() {
        let mut f = Fields::array(ValueKind::Long, 1);
        f.set_long(0, -5_000_000_000);
        assert_eq!(f.get_long(0), -5_000_000_000);
    }

    #[test]
    fn test_weak_holder_skips_referent() {
        let mut e = object(&[true, true]);
        e.fields_mut().set_ref(0, ObjRef::new(5));
        e.fields_mut().set_ref(1, ObjRef::new(6));
        e.insert_flags(ElementFlags::WEAK_REFERENCE);

        assert_eq!(e.traced_references().collect::<Vec<_>>(), vec![ObjRef::new(6)]);
    }

    #[test]
    fn test_monitor_reentrancy() {
        let mut m = Monitor::default();
        let t = ThreadId(1);
        m.lock(t, 1);
        m.lock(t, 1);
        assert!(!m.can_lock(ThreadId(2)));
        assert!(!m.unlock());
        assert!(m.unlock());
        assert!(m.can_lock(ThreadId(2)));
    }

    #[test]
    fn test_release_all_returns_count() {
        let mut m = Monitor::default();
        m.lock(ThreadId(0), 3);
        assert_eq!(m.release_all(), 3);
        assert_eq!(m.owner(), None);
    }

    #[test]
    fn test_init_status_rank() {
        assert!(ClassInitStatus::Uninitialized.rank() < ClassInitStatus::InProgress(ThreadId(0)).rank());
        assert!(ClassInitStatus::InProgress(ThreadId(0)).rank() < ClassInitStatus::Initialized.rank());
    }

    #[test]
    fn test_new_element_sharedness() {
        assert_eq!(object(&[]).sharedness(), Sharedness::ThreadLocal(ThreadId(0)));
    }
}
