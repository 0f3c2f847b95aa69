//! Chunked copy-on-write element arena
//!
//! # Architecture
//!
//! ```text
//! Area
//!  ├─ chunks: Vec<Arc<Chunk>>          64 slots per chunk
//!  │    └─ [Option<Arc<ElementInfo>>; 64]
//!  ├─ occupied: BitSet                 live slots
//!  └─ changed:  BitSet                 slots written since the last memento
//!
//! AreaMemento = (chunk pointers, occupied bits, live count)
//! ```
//!
//! Taking a memento copies chunk pointers only. The first write to a slot
//! afterwards clones that slot's chunk (64 pointers) and the element itself;
//! every untouched chunk and element stays shared with the memento. Snapshot
//! and restore cost therefore follows the number of chunks touched since the
//! previous snapshot, not the number of live elements.

use super::element::ElementInfo;
use bit_set::BitSet;
use std::sync::Arc;

const CHUNK_SHIFT: usize = 6;
const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT;
const CHUNK_MASK: usize = CHUNK_SIZE - 1;

#[derive(Debug, Clone)]
struct Chunk {
    slots: Vec<Option<Arc<ElementInfo>>>,
}

impl Chunk {
    fn empty() -> Self {
        Self {
            slots: vec![None; CHUNK_SIZE],
        }
    }
}

/// Immutable snapshot of an [`Area`]
#[derive(Debug, Clone)]
pub struct AreaMemento {
    chunks: Vec<Arc<Chunk>>,
    occupied: BitSet,
    live: usize,
}

impl AreaMemento {
    /// Number of live elements captured
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Check whether no element was captured
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Indexed element store with structural sharing between snapshots
#[derive(Debug, Clone, Default)]
pub struct Area {
    chunks: Vec<Arc<Chunk>>,
    occupied: BitSet,
    changed: BitSet,
    live: usize,
    free_hint: usize,
    epoch: u64,
}

impl Area {
    /// Create an empty area
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest free slot index
    pub fn next_free(&mut self) -> usize {
        while self.occupied.contains(self.free_hint) {
            self.free_hint += 1;
        }
        self.free_hint
    }

    /// Check whether `idx` holds a live element
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.occupied.contains(idx)
    }

    /// Element at `idx`
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&ElementInfo> {
        self.chunks
            .get(idx >> CHUNK_SHIFT)
            .and_then(|c| c.slots[idx & CHUNK_MASK].as_deref())
    }

    /// Mutable element at `idx`; clones shared chunk and element storage
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ElementInfo> {
        if !self.occupied.contains(idx) {
            return None;
        }
        self.changed.insert(idx);
        self.epoch += 1;
        let chunk = Arc::make_mut(&mut self.chunks[idx >> CHUNK_SHIFT]);
        chunk.slots[idx & CHUNK_MASK].as_mut().map(Arc::make_mut)
    }

    /// Store `element` at `idx`, replacing whatever was there
    pub fn insert(&mut self, idx: usize, element: ElementInfo) {
        let chunk_idx = idx >> CHUNK_SHIFT;
        while self.chunks.len() <= chunk_idx {
            self.chunks.push(Arc::new(Chunk::empty()));
        }
        let chunk = Arc::make_mut(&mut self.chunks[chunk_idx]);
        if chunk.slots[idx & CHUNK_MASK].replace(Arc::new(element)).is_none() {
            self.live += 1;
        }
        self.occupied.insert(idx);
        self.changed.insert(idx);
        self.epoch += 1;
    }

    /// Remove the element at `idx`
    pub fn remove(&mut self, idx: usize) -> Option<Arc<ElementInfo>> {
        if !self.occupied.remove(idx) {
            return None;
        }
        self.live -= 1;
        self.free_hint = self.free_hint.min(idx);
        self.changed.insert(idx);
        self.epoch += 1;
        Arc::make_mut(&mut self.chunks[idx >> CHUNK_SHIFT]).slots[idx & CHUNK_MASK].take()
    }

    /// Number of live elements
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Check whether the area holds no element
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Exclusive upper bound of slot indices ever used
    pub fn capacity(&self) -> usize {
        self.chunks.len() << CHUNK_SHIFT
    }

    /// Live slot indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupied.iter()
    }

    /// Live elements in slot order
    pub fn iter(&self) -> impl Iterator<Item = &ElementInfo> {
        self.occupied.iter().filter_map(|i| self.get(i))
    }

    /// Slots written since the last memento
    pub fn changed(&self) -> &BitSet {
        &self.changed
    }

    /// Mutation epoch (monotonic, survives restores)
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Capture the area and reset the changed set
    pub fn memento(&mut self) -> AreaMemento {
        self.changed.clear();
        AreaMemento {
            chunks: self.chunks.clone(),
            occupied: self.occupied.clone(),
            live: self.live,
        }
    }

    /// Reinstate a captured area
    pub fn restore(&mut self, memento: &AreaMemento) {
        self.chunks.clone_from(&memento.chunks);
        self.occupied.clone_from(&memento.occupied);
        self.live = memento.live;
        self.changed.clear();
        self.free_hint = 0;
        self.epoch += 1;
    }
}
