//! Heap - object store with mark-and-sweep reclamation
//!
//! # Overview
//!
//! The heap is an arena of indexed slots ([`Area`]). Objects refer to each
//! other by [`ObjRef`] index only, so reference cycles need no special
//! treatment. Allocation reuses the lowest free slot and never fails:
//! exceeding the configured live-object limit raises the out-of-memory flag,
//! which the driver inspects and which becomes part of the explored state.
//!
//! # Lifecycle
//!
//! ```text
//! allocate ──> live ──(field/array stores)──> live
//!                │
//!                └── gc(): unmarked && !pinned ──> reclaimed
//! ```
//!
//! Reclamation only ever happens inside an explicit [`Heap::gc`] pass.
//! Dereferencing a reclaimed slot through [`Heap::get`] is an engine bug and
//! panics.

mod area;
mod classes;
mod element;
mod gc;
mod types;

pub use area::{Area, AreaMemento};
pub use classes::{ClassRegistry, CLASS_CLASS, STRING_CLASS, THREAD_CLASS};
pub use element::{
    ClassInitStatus, ElementFlags, ElementInfo, ElementKind, Fields, Monitor, RefMask, Sharedness,
};
pub use gc::{GcRoots, GcStats};
pub use types::{
    ClassDescriptor, ClassDescriptorBuilder, ClassId, FieldDescriptor, FieldLayout, ObjRef,
    ValueKind,
};

use crate::domain::identity::GlobalId;
use crate::domain::threads::ThreadId;
use std::collections::HashMap;
use tracing::warn;

/// Restorable snapshot of a [`Heap`]
#[derive(Debug, Clone)]
pub struct HeapMemento {
    area: AreaMemento,
    out_of_memory: bool,
}

impl HeapMemento {
    /// Number of live objects captured
    pub const fn len(&self) -> usize {
        self.area.len()
    }

    /// Check whether the captured heap was empty
    pub const fn is_empty(&self) -> bool {
        self.area.is_empty()
    }
}

/// Dynamic object store of one program state
#[derive(Debug, Clone, Default)]
pub struct Heap {
    area: Area,
    out_of_memory: bool,
    max_live_objects: Option<usize>,
    interned: HashMap<String, (ObjRef, GlobalId)>,
    flag_epoch: u64,
}

impl Heap {
    /// Create an unbounded heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a heap that raises the out-of-memory flag above `max` live
    /// objects
    pub fn with_limit(max: Option<usize>) -> Self {
        Self {
            max_live_objects: max,
            ..Self::default()
        }
    }

    /// Allocate an instance of `class`
    pub fn allocate(&mut self, class: &ClassDescriptor, thread: Option<ThreadId>, global_id: GlobalId) -> ObjRef {
        let fields = Fields::with_mask(class.instance_layout().ref_mask());
        self.place(|objref| {
            ElementInfo::new(objref, global_id, class.id(), ElementKind::Object, fields, thread)
        })
    }

    /// Allocate an array of `length` elements of `elem`
    pub fn allocate_array(
        &mut self,
        array_class: ClassId,
        elem: ValueKind,
        length: usize,
        thread: Option<ThreadId>,
        global_id: GlobalId,
    ) -> ObjRef {
        let fields = Fields::array(elem, length);
        self.place(|objref| {
            ElementInfo::new(
                objref,
                global_id,
                array_class,
                ElementKind::Array { elem, length },
                fields,
                thread,
            )
        })
    }

    fn place(&mut self, build: impl FnOnce(ObjRef) -> ElementInfo) -> ObjRef {
        let idx = self.area.next_free();
        let objref = ObjRef::new(idx);
        self.area.insert(idx, build(objref));

        if let Some(max) = self.max_live_objects {
            if self.area.len() > max && !self.out_of_memory {
                warn!(live = self.area.len(), max, "heap limit exceeded, raising out-of-memory");
                self.set_out_of_memory(true);
            }
        }
        objref
    }

    /// Dereference a live object
    ///
    /// # Panics
    ///
    /// Panics if `objref` is null or was reclaimed.
    pub fn get(&self, objref: ObjRef) -> &ElementInfo {
        match self.try_get(objref) {
            Some(e) => e,
            None => panic!("dereferencing reclaimed or null heap slot {objref}"),
        }
    }

    /// Dereference without panicking
    pub fn try_get(&self, objref: ObjRef) -> Option<&ElementInfo> {
        if objref.is_null() {
            None
        } else {
            self.area.get(objref.index())
        }
    }

    /// Mutable dereference
    ///
    /// # Panics
    ///
    /// Panics if `objref` is null or was reclaimed.
    pub fn get_mut(&mut self, objref: ObjRef) -> &mut ElementInfo {
        let found = if objref.is_null() { None } else { self.area.get_mut(objref.index()) };
        match found {
            Some(e) => e,
            None => panic!("dereferencing reclaimed or null heap slot {objref}"),
        }
    }

    /// Check whether `objref` is live
    pub fn contains(&self, objref: ObjRef) -> bool {
        !objref.is_null() && self.area.contains(objref.index())
    }

    /// Number of live objects
    pub const fn len(&self) -> usize {
        self.area.len()
    }

    /// Check whether no object is live
    pub const fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// Live objects in slot order
    pub fn iter(&self) -> impl Iterator<Item = &ElementInfo> {
        self.area.iter()
    }

    /// Underlying arena
    pub const fn area(&self) -> &Area {
        &self.area
    }

    /// Out-of-memory flag
    pub const fn is_out_of_memory(&self) -> bool {
        self.out_of_memory
    }

    /// Raise or clear the out-of-memory flag
    pub fn set_out_of_memory(&mut self, oom: bool) {
        if self.out_of_memory != oom {
            self.out_of_memory = oom;
            self.flag_epoch += 1;
        }
    }

    /// Exempt `objref` from reclamation until released
    pub fn register_pin_down(&mut self, objref: ObjRef) {
        self.get_mut(objref).inc_pin_down();
    }

    /// Drop one pin; returns the remaining count
    pub fn release_pin_down(&mut self, objref: ObjRef) -> u32 {
        self.get_mut(objref).dec_pin_down()
    }

    /// Treat field 0 of `holder` as a weak referent
    pub fn register_weak_reference(&mut self, holder: ObjRef) {
        self.get_mut(holder).insert_flags(ElementFlags::WEAK_REFERENCE);
    }

    /// Interned string for `value`, if still live on this path
    ///
    /// The table is not restored on backtrack; each entry is revalidated
    /// against the global id of the slot it points to.
    pub fn interned(&self, value: &str) -> Option<ObjRef> {
        let (objref, gid) = self.interned.get(value)?;
        self.try_get(*objref)
            .filter(|e| e.global_id() == *gid)
            .map(ElementInfo::objref)
    }

    pub(crate) fn record_interned(&mut self, value: &str, objref: ObjRef) {
        let gid = self.get(objref).global_id();
        let e = self.get_mut(objref);
        e.insert_flags(ElementFlags::INTERNED);
        e.inc_pin_down();
        self.interned.insert(value.to_owned(), (objref, gid));
    }

    /// Mutation epoch (monotonic, survives restores)
    pub const fn epoch(&self) -> u64 {
        self.area.epoch() + self.flag_epoch
    }

    /// Capture the heap
    pub fn memento(&mut self) -> HeapMemento {
        HeapMemento {
            area: self.area.memento(),
            out_of_memory: self.out_of_memory,
        }
    }

    /// Reinstate a captured heap
    pub fn restore(&mut self, memento: &HeapMemento) {
        self.area.restore(&memento.area);
        self.out_of_memory = memento.out_of_memory;
        self.flag_epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_class() -> ClassDescriptor {
        let reg = ClassRegistry::new();
        let id = reg.register(
            ClassDescriptor::builder("Node")
                .field("value", ValueKind::Int)
                .field("next", ValueKind::Reference)
                .build(),
        );
        (*reg.get(id)).clone()
    }

    #[test]
    fn test_allocate_and_get() {
        let class = node_class();
        let mut heap = Heap::new();
        let a = heap.allocate(&class, None, GlobalId(0));
        let b = heap.allocate(&class, None, GlobalId(1));

        assert_eq!(a, ObjRef::new(0));
        assert_eq!(b, ObjRef::new(1));
        assert_eq!(heap.get(b).global_id(), GlobalId(1));
        assert_eq!(heap.get(a).class(), class.id());
        assert!(heap.get(a).fields().get_ref(1).is_null());
    }

    #[test]
    #[should_panic(expected = "dereferencing reclaimed")]
    fn test_get_reclaimed_panics() {
        let class = node_class();
        let mut heap = Heap::new();
        let a = heap.allocate(&class, None, GlobalId(0));
        heap.area.remove(a.index());
        let _ = heap.get(a);
    }

    #[test]
    fn test_limit_raises_out_of_memory() {
        let class = node_class();
        let mut heap = Heap::with_limit(Some(2));
        heap.allocate(&class, None, GlobalId(0));
        heap.allocate(&class, None, GlobalId(1));
        assert!(!heap.is_out_of_memory());

        let third = heap.allocate(&class, None, GlobalId(2));
        assert!(heap.is_out_of_memory());
        assert!(heap.contains(third));
    }

    #[test]
    fn test_out_of_memory_is_restored() {
        let mut heap = Heap::new();
        let m = heap.memento();
        heap.set_out_of_memory(true);
        heap.restore(&m);
        assert!(!heap.is_out_of_memory());
    }

    #[test]
    fn test_pin_down_counting() {
        let class = node_class();
        let mut heap = Heap::new();
        let a = heap.allocate(&class, None, GlobalId(0));
        heap.register_pin_down(a);
        heap.register_pin_down(a);
        assert_eq!(heap.release_pin_down(a), 1);
        assert!(heap.get(a).is_pinned());
        assert_eq!(heap.release_pin_down(a), 0);
        assert!(!heap.get(a).is_pinned());
    }

    #[test]
    fn test_array_allocation() {
        let mut heap = Heap::new();
        let arr = heap.allocate_array(ClassId(9), ValueKind::Reference, 3, Some(ThreadId(0)), GlobalId(0));
        let e = heap.get(arr);
        assert_eq!(e.array_length(), Some(3));
        assert!(e.fields().is_reference(2));
        assert_eq!(e.sharedness(), Sharedness::ThreadLocal(ThreadId(0)));
    }

    #[test]
    fn test_interned_entry_invalid_after_restore() {
        let class = node_class();
        let mut heap = Heap::new();
        let m = heap.memento();

        let s = heap.allocate(&class, None, GlobalId(7));
        heap.record_interned("hello", s);
        assert_eq!(heap.interned("hello"), Some(s));

        heap.restore(&m);
        assert_eq!(heap.interned("hello"), None);

        heap.allocate(&class, None, GlobalId(8));
        assert_eq!(heap.interned("hello"), None);
    }
}
