//! Visited-state tables
//!
//! Two collision policies behind one trait:
//!
//! - [`HashedStateTable`] keys on the 64-bit fingerprint. Two distinct
//!   states with equal fingerprints are treated as one, which can prune a
//!   state that was never explored.
//! - [`ExactStateTable`] keys on the full canonical encoding and never
//!   confuses states, at the price of keeping every encoding alive.
//!
//! Both hand out dense state ids in first-visit order and may be shared
//! between threads.

use super::StoringData;
use crate::error::ConfigError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Names accepted by `search.state_table`
pub const STATE_TABLE_NAMES: &[&str] = &["hashed", "exact"];

/// Outcome of a table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// First visit; the state got this id
    New(usize),
    /// Visited before under this id
    Seen(usize),
}

impl Visit {
    /// Id of the state
    pub const fn id(self) -> usize {
        match self {
            Self::New(id) | Self::Seen(id) => id,
        }
    }

    /// Whether this was the first visit
    pub const fn is_new(self) -> bool {
        matches!(self, Self::New(_))
    }
}

/// Set of visited states
pub trait StateTable: Send + Sync + fmt::Debug {
    /// Configuration name
    fn name(&self) -> &'static str;

    /// Record a visit to `state`
    fn visit(&self, state: &StoringData) -> Visit;

    /// Check whether `state` was visited
    fn contains(&self, state: &StoringData) -> bool;

    /// Number of distinct states
    fn len(&self) -> usize;

    /// Check whether no state was visited
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct IdMap<K: Eq + Hash> {
    ids: DashMap<K, usize>,
    next: AtomicUsize,
}

impl<K: Eq + Hash> Default for IdMap<K> {
    fn default() -> Self {
        Self {
            ids: DashMap::new(),
            next: AtomicUsize::new(0),
        }
    }
}

impl<K: Eq + Hash> IdMap<K> {
    fn visit(&self, key: K) -> Visit {
        match self.ids.entry(key) {
            Entry::Occupied(e) => Visit::Seen(*e.get()),
            Entry::Vacant(e) => {
                let id = self.next.fetch_add(1, Ordering::Relaxed);
                e.insert(id);
                Visit::New(id)
            }
        }
    }
}

/// Fingerprint-keyed table
#[derive(Debug, Default)]
pub struct HashedStateTable {
    map: IdMap<u64>,
}

impl HashedStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateTable for HashedStateTable {
    fn name(&self) -> &'static str {
        "hashed"
    }

    fn visit(&self, state: &StoringData) -> Visit {
        self.map.visit(state.hash())
    }

    fn contains(&self, state: &StoringData) -> bool {
        self.map.ids.contains_key(&state.hash())
    }

    fn len(&self) -> usize {
        self.map.ids.len()
    }
}

/// Encoding-keyed table
#[derive(Debug, Default)]
pub struct ExactStateTable {
    map: IdMap<Arc<[i32]>>,
}

impl ExactStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateTable for ExactStateTable {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn visit(&self, state: &StoringData) -> Visit {
        self.map.visit(Arc::clone(state.data_arc()))
    }

    fn contains(&self, state: &StoringData) -> bool {
        self.map.ids.contains_key(state.data())
    }

    fn len(&self) -> usize {
        self.map.ids.len()
    }
}

/// Resolve `search.state_table`
///
/// # Errors
///
/// [`ConfigError::UnknownStateTable`] for an unrecognized name.
pub fn state_table_from_name(name: &str) -> Result<Box<dyn StateTable>, ConfigError> {
    match name {
        "hashed" => Ok(Box::new(HashedStateTable::new())),
        "exact" => Ok(Box::new(ExactStateTable::new())),
        other => Err(ConfigError::UnknownStateTable(other.to_owned())),
    }
}
