//! Integration Test: snapshots, global identities and fingerprints
//!
//! Checks that what the explorer relies on for state matching holds through
//! the public API alone.

use krepis_mc::domain::serializer::encode;
use krepis_mc::domain::{
    ClassDescriptor, ClassId, CreationSite, KernelState, MethodId, StackFrame, StoringData,
    ThreadId, ValueKind,
};

fn fingerprint(ks: &KernelState) -> u64 {
    StoringData::new(encode(ks)).hash()
}

fn node(ks: &KernelState) -> ClassId {
    ks.register_class(
        ClassDescriptor::builder("Node")
            .field("value", ValueKind::Int)
            .field("next", ValueKind::Reference)
            .build(),
    )
}

fn two_threads(ks: &mut KernelState) -> (ThreadId, ThreadId) {
    let a = ks.create_thread("a", None, None);
    let b = ks.create_thread("b", None, None);
    ks.start_thread(a, StackFrame::new(MethodId::new(1), 2)).unwrap();
    ks.start_thread(b, StackFrame::new(MethodId::new(2), 2)).unwrap();
    (a, b)
}

fn site(method: u32, insn: u32) -> Option<CreationSite> {
    Some(CreationSite::new(MethodId::new(method), insn))
}

#[test]
fn test_restore_of_snapshot_is_fingerprint_equal() {
    let mut ks = KernelState::new();
    let class = node(&ks);
    let (a, _) = two_threads(&mut ks);
    let n = ks.new_object(class, Some(a), site(1, 0));
    ks.threads_mut().get_mut(a).top_frame_mut().unwrap().set_local_ref(0, n);
    let before = fingerprint(&ks);

    let m = ks.snapshot();
    ks.restore(&m);
    assert_eq!(fingerprint(&ks), before);

    ks.set_int_field(n, "value", 9).unwrap();
    ks.new_object(class, Some(a), site(1, 3));
    ks.terminate_thread(a).unwrap();
    assert_ne!(fingerprint(&ks), before);

    ks.restore(&m);
    assert_eq!(fingerprint(&ks), before);
    assert_eq!(ks.get_int_field(n, "value").unwrap(), 0);
}

#[test]
fn test_mutate_then_revert_is_fingerprint_equal() {
    let mut ks = KernelState::new();
    let class = node(&ks);
    let (a, _) = two_threads(&mut ks);
    let n = ks.new_object(class, Some(a), site(1, 0));
    ks.threads_mut().get_mut(a).top_frame_mut().unwrap().set_local_ref(0, n);
    let before = fingerprint(&ks);

    ks.set_int_field(n, "value", 1).unwrap();
    assert_ne!(fingerprint(&ks), before);
    ks.set_int_field(n, "value", 0).unwrap();
    assert_eq!(fingerprint(&ks), before);
}

#[test]
fn test_global_ids_are_stable_across_orderings() {
    let mut ks = KernelState::new();
    let class = node(&ks);
    let (a, b) = two_threads(&mut ks);
    let root = ks.snapshot();

    let a1 = ks.new_object(class, Some(a), site(1, 4));
    let b1 = ks.new_object(class, Some(b), site(2, 4));
    let a2 = ks.new_object(class, Some(a), site(1, 4));
    let first = [a1, b1, a2].map(|r| ks.heap().get(r).global_id());

    ks.restore(&root);
    let b1 = ks.new_object(class, Some(b), site(2, 4));
    let a1 = ks.new_object(class, Some(a), site(1, 4));
    let a2 = ks.new_object(class, Some(a), site(1, 4));
    let second = [a1, b1, a2].map(|r| ks.heap().get(r).global_id());

    assert_eq!(first, second);
    assert_ne!(first[0], first[2]);
}

#[test]
fn test_heap_layout_does_not_affect_fingerprint() {
    let mut ks = KernelState::new();
    let class = node(&ks);
    let (a, b) = two_threads(&mut ks);
    let root = ks.snapshot();

    let build = |ks: &mut KernelState, a_first: bool| {
        let (x, y) = if a_first {
            let x = ks.new_object(class, Some(a), site(1, 0));
            (x, ks.new_object(class, Some(b), site(2, 0)))
        } else {
            let y = ks.new_object(class, Some(b), site(2, 0));
            (ks.new_object(class, Some(a), site(1, 0)), y)
        };
        ks.set_ref_field(x, "next", y).unwrap();
        ks.set_int_field(y, "value", 3).unwrap();
        ks.threads_mut().get_mut(a).top_frame_mut().unwrap().set_local_ref(0, x);
        ks.threads_mut().get_mut(b).top_frame_mut().unwrap().set_local_ref(1, y);
        fingerprint(ks)
    };

    let first = build(&mut ks, true);
    ks.restore(&root);
    let second = build(&mut ks, false);
    assert_eq!(first, second);
}

#[test]
fn test_garbage_does_not_affect_fingerprint() {
    let mut ks = KernelState::new();
    let class = node(&ks);
    let (a, _) = two_threads(&mut ks);
    let before = fingerprint(&ks);

    let head = ks.new_object(class, Some(a), site(1, 0));
    let mut tail = head;
    for _ in 0..1_000 {
        let next = ks.new_object(class, Some(a), site(1, 1));
        ks.set_ref_field(tail, "next", next).unwrap();
        tail = next;
    }
    assert_eq!(fingerprint(&ks), before);

    let stats = ks.gc();
    assert_eq!(stats.reclaimed, 1_001);
    assert_eq!(fingerprint(&ks), before);
}
