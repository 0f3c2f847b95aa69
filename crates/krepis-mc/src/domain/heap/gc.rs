//! Mark-and-sweep collection
//!
//! # Algorithm
//!
//! ```text
//! 1. mark   pinned objects        reach |= PINNED
//!           thread roots (t, r)   reach |= {t}
//!           static roots          reach |= STATIC
//!           worklist: pop e, push every traced child whose mask grew
//! 2. sweep  reach == ∅ && pin == 0          → remove, notify released
//! 3. fixup  survivors: recompute sharedness from reach
//!           weak holders: clear field 0 if its referent was swept
//!           scrub cached refs pointing at swept slots
//! ```
//!
//! Masks only grow, so each element is re-queued at most 64 times and the
//! worklist terminates; no recursion is involved, so arbitrarily long
//! reference chains are safe.

use super::area::Area;
use super::element::Sharedness;
use super::types::ObjRef;
use super::Heap;
use crate::domain::bitset::ThreadMask;
use crate::domain::observer::ObserverSet;
use crate::domain::threads::ThreadId;
use std::collections::VecDeque;
use tracing::debug;

/// Root set handed to [`Heap::gc`]
#[derive(Debug, Clone, Default)]
pub struct GcRoots {
    /// References held by thread stacks, paired with the holding thread
    pub threads: Vec<(ThreadId, ObjRef)>,
    /// References held by static fields
    pub statics: Vec<ObjRef>,
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Live objects before the pass
    pub live_before: usize,
    /// Objects found reachable or pinned
    pub marked: usize,
    /// Objects reclaimed
    pub reclaimed: usize,
    /// Weak references cleared
    pub weak_cleared: usize,
    /// Stale cached references removed
    pub scrubbed: usize,
}

struct Marker<'a> {
    area: &'a Area,
    reach: Vec<ThreadMask>,
    queue: VecDeque<usize>,
}

impl<'a> Marker<'a> {
    fn new(area: &'a Area) -> Self {
        Self {
            area,
            reach: vec![ThreadMask::EMPTY; area.capacity()],
            queue: VecDeque::new(),
        }
    }

    fn mark(&mut self, objref: ObjRef, mask: ThreadMask) {
        if objref.is_null() {
            return;
        }
        let idx = objref.index();
        debug_assert!(self.area.contains(idx), "root or field points at free slot {objref}");
        if !self.area.contains(idx) {
            return;
        }
        let grown = self.reach[idx].union(mask);
        if grown != self.reach[idx] {
            self.reach[idx] = grown;
            self.queue.push_back(idx);
        }
    }

    fn drain(&mut self) {
        let area = self.area;
        while let Some(idx) = self.queue.pop_front() {
            let mask = self.reach[idx];
            let Some(element) = area.get(idx) else {
                continue;
            };
            for child in element.traced_references() {
                if child.is_null() || !area.contains(child.index()) {
                    continue;
                }
                let c = child.index();
                let grown = self.reach[c].union(mask);
                if grown != self.reach[c] {
                    self.reach[c] = grown;
                    self.queue.push_back(c);
                }
            }
        }
    }
}

impl Heap {
    /// Reclaim every object that is neither reachable from `roots` nor
    /// pinned
    pub fn gc(&mut self, roots: &GcRoots, observers: &mut ObserverSet) -> GcStats {
        observers.gc_begin();
        let live_before = self.len();

        let reach = {
            let mut marker = Marker::new(&self.area);
            let pinned: Vec<ObjRef> = self
                .area
                .iter()
                .filter(|e| e.is_pinned())
                .map(|e| e.objref())
                .collect();
            for objref in pinned {
                marker.mark(objref, ThreadMask::PINNED);
            }
            for (thread, objref) in &roots.threads {
                marker.mark(*objref, ThreadMask::thread(*thread));
            }
            for objref in &roots.statics {
                marker.mark(*objref, ThreadMask::STATIC);
            }
            marker.drain();
            marker.reach
        };

        let mut stats = GcStats {
            live_before,
            ..GcStats::default()
        };

        let dead: Vec<usize> = self
            .area
            .indices()
            .filter(|i| reach[*i].is_empty())
            .collect();
        for idx in dead {
            if let Some(element) = self.area.remove(idx) {
                observers.object_released(element.objref(), element.global_id());
                stats.reclaimed += 1;
            }
        }

        let survivors: Vec<usize> = self.area.indices().collect();
        stats.marked = survivors.len();
        for idx in survivors {
            self.fix_up(idx, reach[idx], &mut stats);
        }

        debug!(
            live_before = stats.live_before,
            reclaimed = stats.reclaimed,
            weak_cleared = stats.weak_cleared,
            scrubbed = stats.scrubbed,
            "gc finished"
        );
        observers.gc_end();
        stats
    }

    fn fix_up(&mut self, idx: usize, mask: ThreadMask, stats: &mut GcStats) {
        let Some(element) = self.area.get(idx) else {
            return;
        };

        let current = element.sharedness();
        let sharedness = match current {
            Sharedness::Shared => Sharedness::Shared,
            Sharedness::ThreadLocal(owner) => {
                if mask.has_static() || mask.thread_count() > 1 {
                    Sharedness::Shared
                } else {
                    match mask.single_thread() {
                        Some(t) if t != owner => Sharedness::Shared,
                        _ => current,
                    }
                }
            }
        };

        let stale_weak = element.is_weak_reference() && {
            let referent = element.fields().get_ref(0);
            !referent.is_null() && !self.area.contains(referent.index())
        };
        let stale_cached: Vec<ObjRef> = element
            .cached_refs()
            .iter()
            .filter(|r| !self.area.contains(r.index()))
            .copied()
            .collect();

        if sharedness == current && !stale_weak && stale_cached.is_empty() {
            return;
        }

        let Some(element) = self.area.get_mut(idx) else {
            return;
        };
        element.set_sharedness(sharedness);
        if stale_weak {
            element.fields_mut().set_ref(0, ObjRef::NULL);
            stats.weak_cleared += 1;
        }
        if !stale_cached.is_empty() {
            stats.scrubbed += element.retain_cached_refs(|r| !stale_cached.contains(&r));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::heap::{ClassDescriptor, ClassRegistry, ValueKind};
    use crate::domain::identity::GlobalId;

    struct Fixture {
        heap: Heap,
        node: ClassDescriptor,
        observers: ObserverSet,
        next_gid: u32,
    }

    impl Fixture {
        fn new() -> Self {
            let reg = ClassRegistry::new();
            let id = reg.register(
                ClassDescriptor::builder("Node")
                    .field("next", ValueKind::Reference)
                    .field("value", ValueKind::Int)
                    .build(),
            );
            Self {
                heap: Heap::new(),
                node: (*reg.get(id)).clone(),
                observers: ObserverSet::new(),
                next_gid: 0,
            }
        }

        fn alloc(&mut self) -> ObjRef {
            self.alloc_by(ThreadId(0))
        }

        fn alloc_by(&mut self, thread: ThreadId) -> ObjRef {
            self.next_gid += 1;
            self.heap.allocate(&self.node, Some(thread), GlobalId(self.next_gid))
        }

        fn link(&mut self, from: ObjRef, to: ObjRef) {
            self.heap.get_mut(from).fields_mut().set_ref(0, to);
        }

        fn gc(&mut self, roots: &GcRoots) -> GcStats {
            self.heap.gc(roots, &mut self.observers)
        }
    }

    fn thread_roots(refs: &[ObjRef]) -> GcRoots {
        GcRoots {
            threads: refs.iter().map(|r| (ThreadId(0), *r)).collect(),
            statics: Vec::new(),
        }
    }

    #[test]
    fn test_overwritten_field_reclaims_target() {
        let mut f = Fixture::new();
        let root = f.alloc();
        let child = f.alloc();
        f.link(root, child);

        let roots = thread_roots(&[root]);
        assert_eq!(f.gc(&roots).reclaimed, 0);

        f.link(root, ObjRef::NULL);
        let stats = f.gc(&roots);
        assert_eq!(stats.reclaimed, 1);
        assert!(!f.heap.contains(child));
        assert!(f.heap.contains(root));
    }

    #[test]
    fn test_pinned_object_survives_until_released() {
        let mut f = Fixture::new();
        let lonely = f.alloc();
        f.heap.register_pin_down(lonely);

        let roots = GcRoots::default();
        f.gc(&roots);
        assert!(f.heap.contains(lonely));

        f.heap.release_pin_down(lonely);
        f.gc(&roots);
        assert!(!f.heap.contains(lonely));
    }

    #[test]
    fn test_pinned_object_keeps_children_alive() {
        let mut f = Fixture::new();
        let pinned = f.alloc();
        let child = f.alloc();
        f.link(pinned, child);
        f.heap.register_pin_down(pinned);

        f.gc(&GcRoots::default());
        assert!(f.heap.contains(child));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut f = Fixture::new();
        let a = f.alloc();
        let b = f.alloc();
        f.link(a, b);
        f.link(b, a);

        assert_eq!(f.gc(&GcRoots::default()).reclaimed, 2);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let mut f = Fixture::new();
        let head = f.alloc();
        let mut prev = head;
        for _ in 0..100_000 {
            let next = f.alloc();
            f.link(prev, next);
            prev = next;
        }

        let stats = f.gc(&thread_roots(&[head]));
        assert_eq!(stats.reclaimed, 0);
        assert_eq!(stats.marked, 100_001);
    }

    #[test]
    fn test_weak_reference_cleared() {
        let mut f = Fixture::new();
        let holder = f.alloc();
        let referent = f.alloc();
        f.link(holder, referent);
        f.heap.register_weak_reference(holder);

        let stats = f.gc(&thread_roots(&[holder]));
        assert_eq!(stats.weak_cleared, 1);
        assert!(!f.heap.contains(referent));
        assert!(f.heap.get(holder).fields().get_ref(0).is_null());
    }

    #[test]
    fn test_weak_reference_kept_while_strongly_reachable() {
        let mut f = Fixture::new();
        let holder = f.alloc();
        let referent = f.alloc();
        f.link(holder, referent);
        f.heap.register_weak_reference(holder);

        f.gc(&thread_roots(&[holder, referent]));
        assert_eq!(f.heap.get(holder).fields().get_ref(0), referent);
    }

    #[test]
    fn test_cached_refs_scrubbed() {
        let mut f = Fixture::new();
        let keeper = f.alloc();
        let gone = f.alloc();
        f.heap.get_mut(keeper).cache_ref(gone);

        let stats = f.gc(&thread_roots(&[keeper]));
        assert_eq!(stats.scrubbed, 1);
        assert!(f.heap.get(keeper).cached_refs().is_empty());
    }

    #[test]
    fn test_sharedness_from_reachability() {
        let mut f = Fixture::new();
        let a = f.alloc_by(ThreadId(0));
        let b = f.alloc_by(ThreadId(1));
        let shared = f.alloc_by(ThreadId(0));
        f.link(a, shared);
        f.link(b, shared);

        let roots = GcRoots {
            threads: vec![(ThreadId(0), a), (ThreadId(1), b)],
            statics: Vec::new(),
        };
        f.gc(&roots);

        assert_eq!(f.heap.get(a).sharedness(), Sharedness::ThreadLocal(ThreadId(0)));
        assert_eq!(f.heap.get(b).sharedness(), Sharedness::ThreadLocal(ThreadId(1)));
        assert!(f.heap.get(shared).is_shared());
    }

    #[test]
    fn test_static_roots_mark_shared() {
        let mut f = Fixture::new();
        let s = f.alloc();
        f.gc(&GcRoots { threads: Vec::new(), statics: vec![s] });
        assert!(f.heap.get(s).is_shared());
    }

    #[test]
    fn test_sharedness_is_sticky() {
        let mut f = Fixture::new();
        let s = f.alloc();
        f.gc(&GcRoots { threads: Vec::new(), statics: vec![s] });
        f.gc(&thread_roots(&[s]));
        assert!(f.heap.get(s).is_shared());
    }

    #[test]
    fn test_handoff_to_other_thread_is_shared() {
        let mut f = Fixture::new();
        let obj = f.alloc_by(ThreadId(0));
        f.gc(&GcRoots { threads: vec![(ThreadId(1), obj)], statics: Vec::new() });
        assert!(f.heap.get(obj).is_shared());
    }

    #[test]
    fn test_unchanged_survivors_not_copied() {
        let mut f = Fixture::new();
        let a = f.alloc();
        f.gc(&thread_roots(&[a]));
        let _ = f.heap.memento();
        f.gc(&thread_roots(&[a]));
        assert!(f.heap.area().changed().is_empty());
    }
}
