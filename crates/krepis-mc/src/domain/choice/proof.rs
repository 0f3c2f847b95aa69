//! Kani proofs for the choice-generator cursor
//!
//! Candidate lists are bounded to a handful of threads; the properties do
//! not depend on the length beyond that.

#![cfg(kani)]

use super::*;

const MAX_CHOICES: usize = 4;

fn any_generator() -> ChoiceGenerator {
    let n: usize = kani::any();
    kani::assume(n <= MAX_CHOICES);
    let choices = (0..n).map(ThreadId::new).collect();
    ChoiceGenerator::new(ChoiceKind::SharedField, choices, None)
}

/// Exactly `total()` advances succeed, in list order, and the generator is
/// exhausted only after the last one
#[kani::proof]
#[kani::unwind(6)]
fn proof_advance_enumerates_every_choice_once() {
    let mut cg = any_generator();
    let k = cg.total();

    for i in 0..k {
        kani::assert(cg.state() != CgState::Exhausted, "exhausted before the k-th advance");
        kani::assert(cg.advance() == Some(ThreadId::new(i)), "choices enumerated out of order");
    }
    kani::assert(cg.state() == CgState::Exhausted, "not exhausted after the k-th advance");
    kani::assert(cg.advance().is_none(), "advance past the end yielded a choice");
}

/// `reset` returns to the initial cursor position
#[kani::proof]
#[kani::unwind(6)]
fn proof_reset_restarts_enumeration() {
    let mut cg = any_generator();
    let steps: usize = kani::any();
    kani::assume(steps <= MAX_CHOICES);
    for _ in 0..steps {
        cg.advance();
    }
    cg.reset();
    kani::assert(cg.processed() == 0, "reset kept processed choices");
    kani::assert(cg.current().is_none(), "reset kept the current choice");
}
