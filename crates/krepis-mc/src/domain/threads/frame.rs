//! Call-stack frames of modeled threads
//!
//! A frame is a flat `i32` slot vector: `locals` slots first, operand stack
//! above them. A bitset records which slots currently hold references; the
//! GC reads it to find stack roots and the serializer reads it to
//! canonicalize references.

use crate::domain::heap::ObjRef;
use crate::domain::identity::MethodId;
use bit_set::BitSet;

/// One activation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    method: MethodId,
    pc: Option<u32>,
    slots: Vec<i32>,
    refs: BitSet,
    locals: usize,
}

impl StackFrame {
    /// Create a frame for `method` with `max_locals` zeroed local slots and
    /// the pc at instruction 0
    pub fn new(method: MethodId, max_locals: usize) -> Self {
        Self {
            method,
            pc: Some(0),
            slots: vec![0; max_locals],
            refs: BitSet::new(),
            locals: max_locals,
        }
    }

    /// Executing method
    #[inline]
    pub const fn method(&self) -> MethodId {
        self.method
    }

    /// Next instruction index, `None` once the frame has no pc
    #[inline]
    pub const fn pc(&self) -> Option<u32> {
        self.pc
    }

    /// Set the next instruction index
    #[inline]
    pub fn set_pc(&mut self, pc: Option<u32>) {
        self.pc = pc;
    }

    /// Move the pc to the following instruction
    #[inline]
    pub fn advance_pc(&mut self) {
        self.pc = self.pc.map(|p| p + 1);
    }

    /// Store a primitive into a local
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a local slot.
    pub fn set_local(&mut self, idx: usize, value: i32) {
        assert!(idx < self.locals, "local {idx} out of range ({})", self.locals);
        self.slots[idx] = value;
        self.refs.remove(idx);
    }

    /// Store a reference into a local
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a local slot.
    pub fn set_local_ref(&mut self, idx: usize, value: ObjRef) {
        assert!(idx < self.locals, "local {idx} out of range ({})", self.locals);
        self.slots[idx] = value.as_slot();
        self.refs.insert(idx);
    }

    /// Raw local value
    pub fn local(&self, idx: usize) -> i32 {
        self.slots[idx]
    }

    /// Local interpreted as a reference
    pub fn local_ref(&self, idx: usize) -> ObjRef {
        ObjRef::from_slot(self.slots[idx])
    }

    /// Push a primitive operand
    pub fn push(&mut self, value: i32) {
        self.slots.push(value);
    }

    /// Push a reference operand
    pub fn push_ref(&mut self, value: ObjRef) {
        self.refs.insert(self.slots.len());
        self.slots.push(value.as_slot());
    }

    /// Pop the top operand, `None` if the operand stack is empty
    pub fn pop(&mut self) -> Option<i32> {
        if self.slots.len() > self.locals {
            self.refs.remove(self.slots.len() - 1);
            self.slots.pop()
        } else {
            None
        }
    }

    /// Pop the top operand as a reference
    pub fn pop_ref(&mut self) -> Option<ObjRef> {
        self.pop().map(ObjRef::from_slot)
    }

    /// Number of operands above the locals
    pub fn operand_depth(&self) -> usize {
        self.slots.len() - self.locals
    }

    /// All slots, locals first
    pub fn slots(&self) -> &[i32] {
        &self.slots
    }

    /// Whether slot `idx` holds a reference
    pub fn is_reference(&self, idx: usize) -> bool {
        self.refs.contains(idx)
    }

    /// Non-null references held by this frame
    pub fn references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.refs
            .iter()
            .map(|i| ObjRef::from_slot(self.slots[i]))
            .filter(|r| !r.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_stack() {
        let mut f = StackFrame::new(MethodId::new(1), 2);
        f.push(7);
        f.push_ref(ObjRef::new(3));
        assert_eq!(f.operand_depth(), 2);
        assert!(f.is_reference(3));

        assert_eq!(f.pop_ref(), Some(ObjRef::new(3)));
        assert!(!f.is_reference(3));
        assert_eq!(f.pop(), Some(7));
        assert_eq!(f.pop(), None);
    }

    #[test]
    fn test_overwriting_ref_local_clears_mask() {
        let mut f = StackFrame::new(MethodId::new(1), 1);
        f.set_local_ref(0, ObjRef::new(9));
        assert_eq!(f.references().collect::<Vec<_>>(), vec![ObjRef::new(9)]);
        assert_eq!(f.local_ref(0), ObjRef::new(9));

        f.set_local(0, 9);
        assert_eq!(f.references().count(), 0);
    }

    #[test]
    fn test_null_refs_are_not_reported() {
        let mut f = StackFrame::new(MethodId::new(1), 1);
        f.set_local_ref(0, ObjRef::NULL);
        assert!(f.is_reference(0));
        assert_eq!(f.references().count(), 0);
    }

    #[test]
    fn test_pc_advance() {
        let mut f = StackFrame::new(MethodId::new(1), 0);
        f.advance_pc();
        assert_eq!(f.pc(), Some(1));
        f.set_pc(None);
        f.advance_pc();
        assert_eq!(f.pc(), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_local_out_of_range() {
        let mut f = StackFrame::new(MethodId::new(1), 1);
        f.set_local(1, 0);
    }
}
