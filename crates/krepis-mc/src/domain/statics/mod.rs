//! Static Area - per-class static storage
//!
//! Structurally parallel to the heap: static slots are [`ElementInfo`]s of
//! kind [`ElementKind::Static`] in their own [`Area`], indexed by
//! [`ClassId`]. Because class ids are canonical, iterating the area in slot
//! order is already a canonical order.
//!
//! Class initialization is reported as data instead of unwinding: callers
//! ask [`StaticArea::check_initialized`] and get back an [`InitCheck`]
//! telling them whether `<clinit>` has to run first.

use crate::domain::heap::{
    Area, AreaMemento, ClassDescriptor, ClassId, ClassInitStatus, ElementInfo, ElementKind, Fields,
    ObjRef,
};
use crate::domain::identity::GlobalId;
use crate::domain::threads::ThreadId;
use crate::error::KernelError;

/// Outcome of a class-initialization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitCheck {
    /// Statics may be used
    Ready,
    /// `<clinit>` must run before the access is retried
    NeedsInitialization(ClassId),
    /// Another thread is running `<clinit>`; the caller must wait
    InitializingBy(ThreadId),
}

/// Restorable snapshot of a [`StaticArea`]
#[derive(Debug, Clone)]
pub struct StaticsMemento {
    area: AreaMemento,
}

/// Static storage of all loaded classes
#[derive(Debug, Clone, Default)]
pub struct StaticArea {
    area: Area,
}

impl StaticArea {
    /// Create an empty static area
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the static slot of `class`; no-op if it already exists
    pub fn add_class(
        &mut self,
        class: &ClassDescriptor,
        global_id: GlobalId,
        class_object: ObjRef,
    ) -> ClassId {
        let id = class.id();
        if !self.area.contains(id.as_usize()) {
            let element = ElementInfo::new(
                ObjRef::new(id.as_usize()),
                global_id,
                id,
                ElementKind::Static {
                    status: ClassInitStatus::Uninitialized,
                    class_object,
                },
                Fields::with_mask(class.static_layout().ref_mask()),
                None,
            );
            self.area.insert(id.as_usize(), element);
        }
        id
    }

    /// Check whether `class` has a static slot on this path
    pub fn contains(&self, class: ClassId) -> bool {
        self.area.contains(class.as_usize())
    }

    /// Static slot of `class`
    pub fn get(&self, class: ClassId) -> Option<&ElementInfo> {
        self.area.get(class.as_usize())
    }

    /// Static slot of `class`, mutable
    pub fn get_mut(&mut self, class: ClassId) -> Option<&mut ElementInfo> {
        self.area.get_mut(class.as_usize())
    }

    /// Number of loaded classes
    pub const fn len(&self) -> usize {
        self.area.len()
    }

    /// Check whether no class is loaded
    pub const fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// Static slots in class-id order
    pub fn iter(&self) -> impl Iterator<Item = &ElementInfo> {
        self.area.iter()
    }

    /// Init status of `class`
    pub fn status(&self, class: ClassId) -> Option<ClassInitStatus> {
        match self.get(class)?.kind() {
            ElementKind::Static { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Move `class` forward to `next`
    ///
    /// # Errors
    ///
    /// [`KernelError::ClassNotLoaded`] if the class has no static slot,
    /// [`KernelError::InitStatusRegression`] if `next` would move the
    /// status backwards.
    pub fn set_status(&mut self, class: ClassId, next: ClassInitStatus) -> Result<(), KernelError> {
        let current = self
            .status(class)
            .ok_or_else(|| KernelError::ClassNotLoaded(class.to_string()))?;
        if next.rank() < current.rank() {
            return Err(KernelError::InitStatusRegression {
                class: class.to_string(),
                from: current,
                to: next,
            });
        }
        if next == current {
            return Ok(());
        }
        if let Some(ElementKind::Static { status, .. }) = self.get_mut(class).map(ElementInfo::kind_mut) {
            *status = next;
        }
        Ok(())
    }

    /// Whether `thread` may use the statics of `class` right now
    pub fn check_initialized(&self, class: ClassId, thread: ThreadId) -> InitCheck {
        match self.status(class) {
            None | Some(ClassInitStatus::Uninitialized) => InitCheck::NeedsInitialization(class),
            Some(ClassInitStatus::InProgress(owner)) if owner != thread => InitCheck::InitializingBy(owner),
            Some(ClassInitStatus::InProgress(_) | ClassInitStatus::Initialized) => InitCheck::Ready,
        }
    }

    /// Append every reference held in static fields (and class objects)
    pub fn mark_roots(&self, out: &mut Vec<ObjRef>) {
        for slot in self.area.iter() {
            out.extend(slot.traced_references());
        }
    }

    /// Mutation epoch (monotonic, survives restores)
    pub const fn epoch(&self) -> u64 {
        self.area.epoch()
    }

    /// Capture the static area
    pub fn memento(&mut self) -> StaticsMemento {
        StaticsMemento {
            area: self.area.memento(),
        }
    }

    /// Reinstate a captured static area
    pub fn restore(&mut self, memento: &StaticsMemento) {
        self.area.restore(&memento.area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::heap::{ClassRegistry, ValueKind};

    fn setup() -> (StaticArea, ClassId) {
        let reg = ClassRegistry::new();
        let id = reg.register(
            ClassDescriptor::builder("Config")
                .static_field("count", ValueKind::Int)
                .static_field("instance", ValueKind::Reference)
                .build(),
        );
        let mut statics = StaticArea::new();
        statics.add_class(&reg.get(id), GlobalId(1), ObjRef::new(0));
        (statics, id)
    }

    #[test]
    fn test_new_class_needs_initialization() {
        let (statics, id) = setup();
        assert_eq!(statics.status(id), Some(ClassInitStatus::Uninitialized));
        assert_eq!(statics.check_initialized(id, ThreadId(0)), InitCheck::NeedsInitialization(id));
    }

    #[test]
    fn test_init_in_progress_by_other_thread() {
        let (mut statics, id) = setup();
        statics.set_status(id, ClassInitStatus::InProgress(ThreadId(1))).unwrap();

        assert_eq!(statics.check_initialized(id, ThreadId(0)), InitCheck::InitializingBy(ThreadId(1)));
        assert_eq!(statics.check_initialized(id, ThreadId(1)), InitCheck::Ready);
    }

    #[test]
    fn test_status_never_regresses() {
        let (mut statics, id) = setup();
        statics.set_status(id, ClassInitStatus::Initialized).unwrap();

        let err = statics.set_status(id, ClassInitStatus::Uninitialized).unwrap_err();
        assert!(matches!(err, KernelError::InitStatusRegression { .. }));
        assert_eq!(statics.check_initialized(id, ThreadId(0)), InitCheck::Ready);
    }

    #[test]
    fn test_restore_rewinds_status() {
        let (mut statics, id) = setup();
        let m = statics.memento();
        statics.set_status(id, ClassInitStatus::Initialized).unwrap();
        statics.restore(&m);
        assert_eq!(statics.status(id), Some(ClassInitStatus::Uninitialized));
    }

    #[test]
    fn test_roots_include_class_object_and_ref_fields() {
        let (mut statics, id) = setup();
        statics.get_mut(id).unwrap().fields_mut().set_ref(1, ObjRef::new(5));

        let mut roots = Vec::new();
        statics.mark_roots(&mut roots);
        assert!(roots.contains(&ObjRef::new(5)));
        assert!(roots.contains(&ObjRef::new(0)));
    }

    #[test]
    fn test_unknown_class() {
        let mut statics = StaticArea::new();
        let err = statics.set_status(ClassId(42), ClassInitStatus::Initialized).unwrap_err();
        assert!(matches!(err, KernelError::ClassNotLoaded(_)));
        assert_eq!(statics.check_initialized(ClassId(42), ThreadId(0)), InitCheck::NeedsInitialization(ClassId(42)));
    }
}
