//! Boxed-value caches
//!
//! `valueOf` for the small boxed types returns canonical objects for values
//! inside configured bounds, so identity comparisons of boxed values behave
//! as on a real VM. The caches are ordinary heap arrays referenced from
//! static fields of a synthetic [`BOX_CACHES_CLASS`]; they are created on
//! first use on a path and disappear again when the search backtracks past
//! that point.
//!
//! ```text
//! $BoxCaches (statics)
//!   intCache ──> [Integer(-128), Integer(-127), ..., Integer(127)]
//!   longCache ─> null (not used yet on this path)
//! ```

use crate::config::{BoxCacheBounds, CheckerConfig};
use crate::domain::heap::{ClassDescriptor, ClassId, ObjRef, ValueKind};
use crate::domain::kernel::KernelState;
use crate::domain::threads::ThreadId;
use crate::error::KernelError;
use tracing::debug;

/// Synthetic class holding the cache arrays
pub const BOX_CACHES_CLASS: &str = "$BoxCaches";

/// Boxed type served by a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    /// `java.lang.Boolean`
    Boolean,
    /// `java.lang.Byte`
    Byte,
    /// `java.lang.Character`
    Character,
    /// `java.lang.Short`
    Short,
    /// `java.lang.Integer`
    Integer,
    /// `java.lang.Long`
    Long,
}

impl BoxKind {
    /// Every boxed kind
    pub const ALL: [Self; 6] = [
        Self::Boolean,
        Self::Byte,
        Self::Character,
        Self::Short,
        Self::Integer,
        Self::Long,
    ];

    /// Name of the box class
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Boolean => "java.lang.Boolean",
            Self::Byte => "java.lang.Byte",
            Self::Character => "java.lang.Character",
            Self::Short => "java.lang.Short",
            Self::Integer => "java.lang.Integer",
            Self::Long => "java.lang.Long",
        }
    }

    /// Static field of [`BOX_CACHES_CLASS`] holding the cache array
    pub const fn cache_field(self) -> &'static str {
        match self {
            Self::Boolean => "booleanCache",
            Self::Byte => "byteCache",
            Self::Character => "charCache",
            Self::Short => "shortCache",
            Self::Integer => "intCache",
            Self::Long => "longCache",
        }
    }

    /// Kind of the `value` field
    pub const fn value_kind(self) -> ValueKind {
        match self {
            Self::Boolean => ValueKind::Boolean,
            Self::Byte => ValueKind::Byte,
            Self::Character => ValueKind::Char,
            Self::Short => ValueKind::Short,
            Self::Integer => ValueKind::Int,
            Self::Long => ValueKind::Long,
        }
    }

    /// Inclusive cached range
    pub const fn bounds(self, bounds: &BoxCacheBounds) -> (i64, i64) {
        match self {
            Self::Boolean => (0, 1),
            Self::Byte => (bounds.byte_low, bounds.byte_high),
            Self::Character => (0, bounds.char_high),
            Self::Short => (bounds.short_low, bounds.short_high),
            Self::Integer => (bounds.int_low, bounds.int_high),
            Self::Long => (bounds.long_low, bounds.long_high),
        }
    }
}

/// `valueOf` with per-path, lazily created caches
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxCache {
    bounds: BoxCacheBounds,
}

impl BoxCache {
    /// Cache with explicit bounds
    pub const fn new(bounds: BoxCacheBounds) -> Self {
        Self { bounds }
    }

    /// Cache with the configured bounds
    pub const fn from_config(config: &CheckerConfig) -> Self {
        Self::new(config.box_cache)
    }

    /// Configured bounds
    pub const fn bounds(&self) -> &BoxCacheBounds {
        &self.bounds
    }

    /// Boxed object for `value`, canonical when `value` is within bounds
    ///
    /// The first call for a kind on a path creates its whole cache array,
    /// allocated by `thread`.
    ///
    /// # Errors
    ///
    /// Propagates field-access failures of the synthetic classes.
    pub fn value_of(
        &self,
        ks: &mut KernelState,
        thread: ThreadId,
        kind: BoxKind,
        value: i64,
    ) -> Result<ObjRef, KernelError> {
        let (low, high) = kind.bounds(&self.bounds);
        if value < low || value > high {
            return new_box(ks, thread, kind, value);
        }

        let caches = caches_class(ks);
        let mut array = ks.get_static_ref(caches, kind.cache_field())?;
        if array.is_null() {
            array = self.fill(ks, thread, kind)?;
            ks.set_static_ref(caches, kind.cache_field(), array)?;
        }
        let slot = usize::try_from(value - low).unwrap_or_default();
        Ok(ks.heap().get(array).fields().get_ref(slot))
    }

    /// Cache array of `kind` on the current path, if created
    pub fn cache_array(&self, ks: &KernelState, kind: BoxKind) -> Option<ObjRef> {
        let class = ks.classes().lookup(BOX_CACHES_CLASS)?;
        ks.get_static_ref(class, kind.cache_field())
            .ok()
            .filter(|a| !a.is_null())
    }

    fn fill(&self, ks: &mut KernelState, thread: ThreadId, kind: BoxKind) -> Result<ObjRef, KernelError> {
        let (low, high) = kind.bounds(&self.bounds);
        let len = usize::try_from(high - low + 1).unwrap_or_default();
        let array = ks.new_array(ValueKind::Reference, len, Some(thread), None);
        for (slot, value) in (low..=high).enumerate() {
            let boxed = new_box(ks, thread, kind, value)?;
            ks.heap_mut().get_mut(array).fields_mut().set_ref(slot, boxed);
        }
        debug!(class = kind.class_name(), low, high, "box cache created");
        Ok(array)
    }
}

fn caches_class(ks: &mut KernelState) -> ClassId {
    let mut desc = ClassDescriptor::builder(BOX_CACHES_CLASS);
    for kind in BoxKind::ALL {
        desc = desc.static_field(kind.cache_field(), ValueKind::Reference);
    }
    let class = ks.register_class(desc.build());
    ks.load_class(class)
}

#[allow(clippy::cast_possible_truncation)]
fn new_box(ks: &mut KernelState, thread: ThreadId, kind: BoxKind, value: i64) -> Result<ObjRef, KernelError> {
    let class = ks.register_class(
        ClassDescriptor::builder(kind.class_name())
            .field("value", kind.value_kind())
            .build(),
    );
    let boxed = ks.new_object(class, Some(thread), None);
    match kind {
        BoxKind::Long => ks.set_long_field(boxed, "value", value)?,
        _ => ks.set_int_field(boxed, "value", value as i32)?,
    }
    Ok(boxed)
}
