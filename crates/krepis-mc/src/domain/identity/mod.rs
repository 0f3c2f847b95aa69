//! Global Identity - path-stable ids for dynamically created entities
//!
//! # Overview
//!
//! Heap indices depend on allocation order, which differs between explored
//! interleavings. Fingerprints therefore never encode heap indices. Every
//! object, thread and class slot is stamped at creation time with a
//! [`GlobalId`] derived from *where* it was created:
//!
//! ```text
//! GlobalIdKey = (creating thread gid, ordinal, creating method, insn index)
//!                     │                  │
//!                     │                  └─ per (thread, method, insn) counter,
//!                     │                     part of the memento
//!                     └─ 0 when there is no creating thread
//! ```
//!
//! Keys are interned in an [`IdPool`] that is shared by every path of the
//! search and never restored, so the same logical creation event maps to
//! the same dense integer no matter which branch performs it first.
//!
//! # Design Notes
//!
//! The counters live in an `Arc<HashMap>` so a memento is a pointer copy;
//! the first creation after a snapshot pays for one map clone.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Canonical, path-independent identity of a created entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

impl GlobalId {
    /// Create a GlobalId from its dense index
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw dense index (suitable for array indexing)
    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Value used when this id is written into a canonical encoding
    #[inline(always)]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_slot(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gid#{}", self.0)
    }
}

/// Opaque method identifier supplied by the class-loading collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl MethodId {
    /// Create a new MethodId
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Program point that performs a creation (method + instruction index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreationSite {
    /// Executing method
    pub method: MethodId,
    /// Instruction index within the method
    pub insn: u32,
}

impl CreationSite {
    /// Create a creation site
    #[inline(always)]
    pub const fn new(method: MethodId, insn: u32) -> Self {
        Self { method, insn }
    }
}

/// Identity key tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalIdKey {
    /// Global id of the creating thread, 0 if none
    pub thread: u32,
    /// Creation ordinal for (thread, method, insn), starting at 1
    pub count: u32,
    /// Creating method, -1 if none
    pub method: i64,
    /// Creating instruction index, -1 if none
    pub insn: i64,
}

#[derive(Debug, Default)]
struct PoolInner {
    ids: HashMap<GlobalIdKey, GlobalId>,
    keys: Vec<GlobalIdKey>,
}

/// Key → dense id pool, shared by all explored paths
///
/// Cloning an `IdPool` yields another handle to the same pool.
#[derive(Debug, Clone, Default)]
pub struct IdPool {
    inner: Arc<RwLock<PoolInner>>,
}

impl IdPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a key to its dense id, assigning the next free id on first use
    pub fn intern(&self, key: GlobalIdKey) -> GlobalId {
        if let Some(id) = self.inner.read().ids.get(&key) {
            return *id;
        }

        let mut inner = self.inner.write();
        let next = GlobalId(u32::try_from(inner.keys.len()).unwrap_or(u32::MAX));
        let id = *inner.ids.entry(key).or_insert(next);
        if id == next {
            inner.keys.push(key);
        }
        id
    }

    /// Reverse lookup
    pub fn key_of(&self, id: GlobalId) -> Option<GlobalIdKey> {
        self.inner.read().keys.get(id.0 as usize).copied()
    }

    /// Number of distinct keys seen so far
    pub fn len(&self) -> usize {
        self.inner.read().keys.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type CounterKey = (u32, i64, i64);

// Never produced by a CreationSite (method ids are unsigned)
const CLASS_OBJECT_METHOD: i64 = -2;

/// Restorable creation counters of a [`GlobalIdManager`]
#[derive(Debug, Clone)]
pub struct IdMemento {
    counters: Arc<HashMap<CounterKey, u32>>,
}

/// Assigns [`GlobalId`]s from per-path creation counters
#[derive(Debug, Clone)]
pub struct GlobalIdManager {
    pool: IdPool,
    counters: Arc<HashMap<CounterKey, u32>>,
    epoch: u64,
}

impl Default for GlobalIdManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalIdManager {
    /// Create a manager with a private pool
    pub fn new() -> Self {
        Self::with_pool(IdPool::new())
    }

    /// Create a manager that shares `pool` with other managers
    pub fn with_pool(pool: IdPool) -> Self {
        Self {
            pool,
            counters: Arc::new(HashMap::new()),
            epoch: 0,
        }
    }

    /// Handle to the shared pool
    pub fn pool(&self) -> &IdPool {
        &self.pool
    }

    /// Allocate the id for the next creation by `thread` at `site`
    pub fn new_id(&mut self, thread: Option<GlobalId>, site: Option<CreationSite>) -> GlobalId {
        let tgid = thread.map_or(0, GlobalId::as_u32);
        let (method, insn) = site.map_or((-1, -1), |s| (i64::from(s.method.0), i64::from(s.insn)));

        let counters = Arc::make_mut(&mut self.counters);
        let count = counters.entry((tgid, method, insn)).or_insert(0);
        *count += 1;
        let key = GlobalIdKey {
            thread: tgid,
            count: *count,
            method,
            insn,
        };

        self.epoch += 1;
        self.pool.intern(key)
    }

    /// Id of the class object for class slot `index`
    ///
    /// Independent of which thread loads the class first, and not counted.
    pub fn class_object_id(&self, index: u32) -> GlobalId {
        self.pool.intern(GlobalIdKey {
            thread: 0,
            count: 0,
            method: CLASS_OBJECT_METHOD,
            insn: i64::from(index),
        })
    }

    /// Mutation epoch (monotonic, survives restores)
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Capture the counters
    pub fn memento(&self) -> IdMemento {
        IdMemento {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Reinstate counters captured by [`memento`](Self::memento)
    pub fn restore(&mut self, memento: &IdMemento) {
        self.counters = Arc::clone(&memento.counters);
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(m: u32, i: u32) -> Option<CreationSite> {
        Some(CreationSite::new(MethodId::new(m), i))
    }

    #[test]
    fn test_first_id_without_thread_is_zero() {
        let mut ids = GlobalIdManager::new();
        assert_eq!(ids.new_id(None, None), GlobalId(0));
        assert_eq!(
            ids.pool().key_of(GlobalId(0)),
            Some(GlobalIdKey { thread: 0, count: 1, method: -1, insn: -1 })
        );
    }

    #[test]
    fn test_repeated_site_gets_fresh_ids() {
        let mut ids = GlobalIdManager::new();
        let a = ids.new_id(Some(GlobalId(0)), site(1, 4));
        let b = ids.new_id(Some(GlobalId(0)), site(1, 4));
        assert_ne!(a, b);
    }

    #[test]
    fn test_restore_replays_same_ids() {
        let mut ids = GlobalIdManager::new();
        ids.new_id(None, None);
        let m = ids.memento();

        let first = ids.new_id(Some(GlobalId(0)), site(2, 0));
        ids.restore(&m);
        let replayed = ids.new_id(Some(GlobalId(0)), site(2, 0));

        assert_eq!(first, replayed);
    }

    #[test]
    fn test_ids_independent_of_interleaving() {
        let pool = IdPool::new();
        let t1 = GlobalId(1);
        let t2 = GlobalId(2);

        let mut path_a = GlobalIdManager::with_pool(pool.clone());
        let a1 = path_a.new_id(Some(t1), site(7, 3));
        let a2 = path_a.new_id(Some(t2), site(7, 3));

        let mut path_b = GlobalIdManager::with_pool(pool.clone());
        let b2 = path_b.new_id(Some(t2), site(7, 3));
        let b1 = path_b.new_id(Some(t1), site(7, 3));

        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_class_object_ids_are_uncounted() {
        let mut ids = GlobalIdManager::new();
        let a = ids.class_object_id(3);
        ids.new_id(None, None);
        assert_eq!(ids.class_object_id(3), a);
        assert_ne!(ids.class_object_id(4), a);
    }

    #[test]
    fn test_epoch_advances_on_restore() {
        let mut ids = GlobalIdManager::new();
        let m = ids.memento();
        let before = ids.epoch();
        ids.restore(&m);
        assert!(ids.epoch() > before);
    }
}
