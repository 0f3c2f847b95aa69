use super::*;
use crate::domain::heap::{ClassDescriptor, ClassId, ValueKind};
use crate::domain::identity::{CreationSite, MethodId};
use crate::domain::threads::{StackFrame, ThreadId};

fn node_class(ks: &KernelState) -> ClassId {
    ks.register_class(
        ClassDescriptor::builder("Node")
            .field("value", ValueKind::Int)
            .field("next", ValueKind::Reference)
            .build(),
    )
}

fn main_thread(ks: &mut KernelState) -> ThreadId {
    let t = ks.create_thread("main", None, None);
    ks.start_thread(t, StackFrame::new(MethodId::new(1), 4)).unwrap();
    t
}

fn site(insn: u32) -> Option<CreationSite> {
    Some(CreationSite::new(MethodId::new(1), insn))
}

fn store_local(ks: &mut KernelState, t: ThreadId, idx: usize, obj: ObjRef) {
    ks.threads_mut()
        .get_mut(t)
        .top_frame_mut()
        .unwrap()
        .set_local_ref(idx, obj);
}

#[test]
fn test_encoding_is_deterministic() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let n = ks.new_object(class, Some(t), site(0));
    store_local(&mut ks, t, 0, n);

    assert_eq!(encode(&ks), encode(&ks));
    assert_eq!(StoringData::new(encode(&ks)), StoringData::new(encode(&ks)));
}

#[test]
fn test_allocation_order_does_not_matter() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let root = ks.snapshot();

    let a = ks.new_object(class, Some(t), site(10));
    let b = ks.new_object(class, Some(t), site(20));
    store_local(&mut ks, t, 0, a);
    store_local(&mut ks, t, 1, b);
    ks.set_ref_field(a, "next", b).unwrap();
    let first = StoringData::new(encode(&ks));

    ks.restore(&root);
    let b2 = ks.new_object(class, Some(t), site(20));
    let a2 = ks.new_object(class, Some(t), site(10));
    store_local(&mut ks, t, 0, a2);
    store_local(&mut ks, t, 1, b2);
    ks.set_ref_field(a2, "next", b2).unwrap();
    let second = StoringData::new(encode(&ks));

    assert_ne!(a, a2);
    assert_eq!(first.data(), second.data());
    assert_eq!(first.hash(), second.hash());
}

#[test]
fn test_field_values_are_encoded() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let n = ks.new_object(class, Some(t), site(0));
    store_local(&mut ks, t, 0, n);

    let before = encode(&ks);
    ks.set_int_field(n, "value", 42).unwrap();
    assert_ne!(before, encode(&ks));
}

#[test]
fn test_unreachable_objects_are_not_encoded() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let before = encode(&ks);

    ks.new_object(class, Some(t), site(0));
    assert_eq!(before, encode(&ks));
}

#[test]
fn test_cycles_terminate() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let a = ks.new_object(class, Some(t), site(0));
    let b = ks.new_object(class, Some(t), site(1));
    ks.set_ref_field(a, "next", b).unwrap();
    ks.set_ref_field(b, "next", a).unwrap();
    store_local(&mut ks, t, 0, a);

    let data = encode(&ks);
    let gid_a = ks.heap().get(a).global_id().as_slot();
    assert!(data.iter().filter(|v| **v == gid_a).count() >= 2);
}

#[test]
fn test_statics_and_atomic_owner_are_encoded() {
    let mut ks = KernelState::new();
    let class = ks.register_class(
        ClassDescriptor::builder("Counter")
            .static_field("count", ValueKind::Int)
            .build(),
    );
    let t = main_thread(&mut ks);
    ks.load_class(class);
    let base = encode(&ks);

    ks.set_static_int(class, "count", 3).unwrap();
    let counted = encode(&ks);
    assert_ne!(base, counted);

    ks.begin_atomic(t);
    assert_ne!(counted, encode(&ks));
}

#[test]
fn test_lock_acquisition_order_does_not_matter() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let a = ks.new_object(class, Some(t), site(0));
    let b = ks.new_object(class, Some(t), site(1));
    store_local(&mut ks, t, 0, a);
    store_local(&mut ks, t, 1, b);
    let root = ks.snapshot();

    ks.lock(t, a);
    ks.lock(t, b);
    let ab = encode(&ks);

    ks.restore(&root);
    ks.lock(t, b);
    ks.lock(t, a);
    assert_eq!(encode(&ks), ab);

    ks.restore(&root);
    ks.lock(t, a);
    assert_ne!(encode(&ks), ab);
}

#[test]
fn test_pending_unpark_permit_is_encoded() {
    let mut ks = KernelState::new();
    let t = main_thread(&mut ks);
    let base = encode(&ks);

    ks.unpark(t);
    let permitted = encode(&ks);
    assert_ne!(base, permitted);

    ks.park(t);
    assert_eq!(encode(&ks), base);
}

// ─── Caching ────────────────────────────────────────────────────────────────

#[test]
fn test_fingerprint_is_cached_until_a_mutation() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let mut ser = FilteringSerializer::attach(&ks).unwrap();

    let a = ser.fingerprint(&ks);
    let b = ser.fingerprint(&ks);
    assert_eq!(a, b);
    assert_eq!(ser.computed(), 1);

    let n = ks.new_object(class, Some(t), site(0));
    store_local(&mut ks, t, 0, n);
    let c = ser.fingerprint(&ks);
    assert_ne!(a, c);
    assert_eq!(ser.computed(), 2);
}

#[test]
fn test_prime_after_restore_skips_encoding() {
    let mut ks = KernelState::new();
    let class = node_class(&ks);
    let t = main_thread(&mut ks);
    let mut ser = FilteringSerializer::attach(&ks).unwrap();

    let m = ks.snapshot();
    let stored = ser.fingerprint(&ks);
    let n = ks.new_object(class, Some(t), site(0));
    store_local(&mut ks, t, 0, n);
    ser.fingerprint(&ks);
    assert_eq!(ser.computed(), 2);

    ks.restore(&m);
    ser.prime(&ks, stored.clone());
    assert_eq!(ser.fingerprint(&ks), stored);
    assert_eq!(ser.computed(), 2);
    assert_eq!(StoringData::new(encode(&ks)), stored);
}

#[test]
fn test_single_serializer_per_kernel() {
    let ks = KernelState::new();
    let first = FilteringSerializer::attach(&ks).unwrap();
    assert_eq!(
        FilteringSerializer::attach(&ks).unwrap_err(),
        KernelError::IncrementalTrackerConflict
    );
    drop(first);
    assert!(FilteringSerializer::attach(&ks).is_ok());
}
