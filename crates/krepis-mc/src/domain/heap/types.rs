//! Heap value types: references, class ids, field layouts

use std::fmt;
use std::sync::Arc;

/// Index of a heap slot, or null
///
/// References are plain integers into an arena; cyclic object graphs need
/// no ownership tricks. The raw value doubles as the slot encoding stored
/// in fields and stack frames, with `-1` as null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub i32);

impl ObjRef {
    /// The null reference
    pub const NULL: Self = Self(-1);

    /// Reference to slot `index`
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn new(index: usize) -> Self {
        Self(index as i32)
    }

    /// Decode a raw slot value
    #[inline(always)]
    pub const fn from_slot(value: i32) -> Self {
        Self(value)
    }

    /// Encode as a raw slot value
    #[inline(always)]
    pub const fn as_slot(self) -> i32 {
        self.0
    }

    /// Check for null
    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0 < 0
    }

    /// Slot index
    ///
    /// # Panics
    ///
    /// Panics on null.
    #[inline(always)]
    #[allow(clippy::cast_sign_loss)]
    pub const fn index(self) -> usize {
        assert!(self.0 >= 0, "null dereference");
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

/// Registry-assigned class identifier
///
/// Class ids are handed out once per class name for the whole search, so
/// they are canonical and double as static-area slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Create a ClassId
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Static-area slot of this class
    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Value used in canonical encodings
    #[inline(always)]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_slot(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Kind of a field or array element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `float` (stored as raw bits)
    Float,
    /// `long` (two slots)
    Long,
    /// `double` (two slots, raw bits)
    Double,
    /// Object reference
    Reference,
}

impl ValueKind {
    /// Number of `i32` slots one value occupies
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Whether values of this kind are references
    #[inline]
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    /// Type descriptor character, used to name array classes
    pub const fn descriptor(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Byte => 'B',
            Self::Char => 'C',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Float => 'F',
            Self::Long => 'J',
            Self::Double => 'D',
            Self::Reference => 'L',
        }
    }
}

/// Declared field of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Field kind
    pub kind: ValueKind,
}

/// Flattened slot layout of a set of fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldLayout {
    fields: Vec<(FieldDescriptor, usize)>,
    slots: usize,
    refs: Arc<[bool]>,
}

impl FieldLayout {
    /// Lay out `fields` in declaration order
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        let mut offset = 0;
        let mut refs = Vec::new();
        let mut laid_out = Vec::with_capacity(fields.len());
        for field in fields {
            let width = field.kind.width();
            refs.extend(std::iter::repeat_n(field.kind.is_reference(), width));
            laid_out.push((field, offset));
            offset += width;
        }
        Self {
            fields: laid_out,
            slots: offset,
            refs: refs.into(),
        }
    }

    /// Total slot count
    pub const fn slot_count(&self) -> usize {
        self.slots
    }

    /// Per-slot reference mask
    pub fn ref_mask(&self) -> &Arc<[bool]> {
        &self.refs
    }

    /// Slot offset and kind of `name`
    pub fn lookup(&self, name: &str) -> Option<(usize, ValueKind)> {
        self.fields
            .iter()
            .find(|(f, _)| f.name == name)
            .map(|(f, off)| (*off, f.kind))
    }

    /// Declared fields with their offsets
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, usize)> {
        self.fields.iter().map(|(f, off)| (f, *off))
    }
}

/// Class shape supplied by the class-loading collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    name: String,
    id: ClassId,
    instance: FieldLayout,
    statics: FieldLayout,
    array_of: Option<ValueKind>,
}

impl ClassDescriptor {
    /// Start describing a class
    pub fn builder(name: impl Into<String>) -> ClassDescriptorBuilder {
        ClassDescriptorBuilder {
            name: name.into(),
            instance: Vec::new(),
            statics: Vec::new(),
        }
    }

    pub(crate) fn array(kind: ValueKind) -> Self {
        Self {
            name: format!("[{}", kind.descriptor()),
            id: ClassId(0),
            instance: FieldLayout::default(),
            statics: FieldLayout::default(),
            array_of: Some(kind),
        }
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry id (0 until registered)
    pub const fn id(&self) -> ClassId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ClassId) {
        self.id = id;
    }

    /// Instance field layout
    pub const fn instance_layout(&self) -> &FieldLayout {
        &self.instance
    }

    /// Static field layout
    pub const fn static_layout(&self) -> &FieldLayout {
        &self.statics
    }

    /// Element kind if this is an array class
    pub const fn array_element(&self) -> Option<ValueKind> {
        self.array_of
    }
}

/// Builder for [`ClassDescriptor`]
#[derive(Debug, Clone)]
pub struct ClassDescriptorBuilder {
    name: String,
    instance: Vec<FieldDescriptor>,
    statics: Vec<FieldDescriptor>,
}

impl ClassDescriptorBuilder {
    /// Declare an instance field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.instance.push(FieldDescriptor { name: name.into(), kind });
        self
    }

    /// Declare a static field
    #[must_use]
    pub fn static_field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.statics.push(FieldDescriptor { name: name.into(), kind });
        self
    }

    /// Compute the layouts
    pub fn build(self) -> ClassDescriptor {
        ClassDescriptor {
            name: self.name,
            id: ClassId(0),
            instance: FieldLayout::new(self.instance),
            statics: FieldLayout::new(self.statics),
            array_of: None,
        }
    }
}
