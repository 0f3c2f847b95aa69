//! Class registry shared by every explored path
//!
//! Class resolution is path-independent: once a name is registered it keeps
//! its [`ClassId`] for the rest of the search. The registry is therefore
//! shared (not part of any memento) and guarded by a `parking_lot` lock.

use super::types::{ClassDescriptor, ClassId, ValueKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the synthetic class whose instances represent threads
pub const THREAD_CLASS: &str = "java.lang.Thread";
/// Name of the synthetic class whose instances represent loaded classes
pub const CLASS_CLASS: &str = "java.lang.Class";
/// Name of the string class used by interning
pub const STRING_CLASS: &str = "java.lang.String";

#[derive(Debug, Default)]
struct Registry {
    classes: Vec<Arc<ClassDescriptor>>,
    by_name: HashMap<String, ClassId>,
}

/// Shared `name → ClassDescriptor` table
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl ClassRegistry {
    /// Create a registry pre-populated with the core runtime classes
    pub fn new() -> Self {
        let registry = Self::default();
        registry.register(ClassDescriptor::builder(CLASS_CLASS).build());
        registry.register(
            ClassDescriptor::builder(THREAD_CLASS)
                .field("priority", ValueKind::Int)
                .build(),
        );
        registry.register(
            ClassDescriptor::builder(STRING_CLASS)
                .field("value", ValueKind::Reference)
                .build(),
        );
        registry
    }

    /// Register a class, returning the existing id if the name is known
    pub fn register(&self, mut class: ClassDescriptor) -> ClassId {
        if let Some(id) = self.lookup(class.name()) {
            return id;
        }

        let mut inner = self.inner.write();
        if let Some(id) = inner.by_name.get(class.name()) {
            return *id;
        }
        let id = ClassId(u32::try_from(inner.classes.len()).unwrap_or(u32::MAX));
        class.set_id(id);
        inner.by_name.insert(class.name().to_owned(), id);
        inner.classes.push(Arc::new(class));
        id
    }

    /// Id of the array class with element `kind`, registered on first use
    pub fn array_class(&self, kind: ValueKind) -> ClassId {
        self.register(ClassDescriptor::array(kind))
    }

    /// Find a class by name
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Descriptor of `id`
    ///
    /// # Panics
    ///
    /// Panics on an id this registry never issued.
    pub fn get(&self, id: ClassId) -> Arc<ClassDescriptor> {
        match self.inner.read().classes.get(id.as_usize()) {
            Some(c) => Arc::clone(c),
            None => panic!("unregistered {id}"),
        }
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.inner.read().classes.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
