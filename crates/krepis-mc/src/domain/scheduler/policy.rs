//! Scheduling policies
//!
//! A policy post-processes the candidate list of every decision: it may
//! reorder candidates or drop some, but never add threads that are not
//! runnable. This is the only extension point for alternative schedules.

use crate::config::SchedulerConfig;
use crate::domain::kernel::KernelState;
use crate::domain::threads::ThreadId;
use crate::error::ConfigError;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::fmt;

/// Names accepted by `scheduler.policy`
pub const POLICY_NAMES: &[&str] = &["default", "round_robin", "priority", "randomized"];

/// Candidate filter applied at every decision point
pub trait SchedulingPolicy: Send + Sync + fmt::Debug {
    /// Configuration name
    fn name(&self) -> &'static str;

    /// Reorder or narrow `candidates` (runnable threads in id order);
    /// `current` is the thread that reached the decision point
    fn filter(&self, ks: &KernelState, current: Option<ThreadId>, candidates: Vec<ThreadId>) -> Vec<ThreadId>;
}

/// Candidates in thread-id order
#[derive(Debug, Default, Clone, Copy)]
pub struct InOrder;

impl SchedulingPolicy for InOrder {
    fn name(&self) -> &'static str {
        "default"
    }

    fn filter(&self, _ks: &KernelState, _current: Option<ThreadId>, candidates: Vec<ThreadId>) -> Vec<ThreadId> {
        candidates
    }
}

/// Candidates rotated so the thread after `current` comes first
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl SchedulingPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn filter(&self, _ks: &KernelState, current: Option<ThreadId>, mut candidates: Vec<ThreadId>) -> Vec<ThreadId> {
        if let Some(current) = current {
            let split = candidates.iter().position(|t| *t > current).unwrap_or(0);
            candidates.rotate_left(split);
        }
        candidates
    }
}

/// Only the candidates with the highest priority
#[derive(Debug, Default, Clone, Copy)]
pub struct Priority;

impl SchedulingPolicy for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn filter(&self, ks: &KernelState, _current: Option<ThreadId>, candidates: Vec<ThreadId>) -> Vec<ThreadId> {
        let priority = |t: &ThreadId| ks.threads().get(*t).priority();
        let Some(top) = candidates.iter().map(priority).max() else {
            return candidates;
        };
        candidates.into_iter().filter(|t| priority(t) == top).collect()
    }
}

/// Candidates shuffled by a seeded generator
///
/// The sequence of shuffles is reproducible for a given seed and decision
/// order.
pub struct Randomized {
    rng: Mutex<ChaCha20Rng>,
    seed: u64,
}

impl Randomized {
    /// Create a policy seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
            seed,
        }
    }
}

impl fmt::Debug for Randomized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Randomized").field("seed", &self.seed).finish()
    }
}

impl SchedulingPolicy for Randomized {
    fn name(&self) -> &'static str {
        "randomized"
    }

    fn filter(&self, _ks: &KernelState, _current: Option<ThreadId>, mut candidates: Vec<ThreadId>) -> Vec<ThreadId> {
        candidates.shuffle(&mut *self.rng.lock());
        candidates
    }
}

/// Resolve `scheduler.policy`
///
/// # Errors
///
/// [`ConfigError::UnknownPolicy`] for an unrecognized name.
pub fn policy_from_config(config: &SchedulerConfig) -> Result<Box<dyn SchedulingPolicy>, ConfigError> {
    match config.policy.as_str() {
        "default" => Ok(Box::new(InOrder)),
        "round_robin" => Ok(Box::new(RoundRobin)),
        "priority" => Ok(Box::new(Priority)),
        "randomized" => Ok(Box::new(Randomized::new(config.seed))),
        other => Err(ConfigError::UnknownPolicy(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::MethodId;
    use crate::domain::threads::StackFrame;

    fn kernel(n: usize) -> KernelState {
        let mut ks = KernelState::new();
        for i in 0..n {
            let t = ks.create_thread(format!("t{i}"), None, None);
            ks.start_thread(t, StackFrame::new(MethodId::new(0), 0)).unwrap();
        }
        ks
    }

    fn ids(raw: &[usize]) -> Vec<ThreadId> {
        raw.iter().copied().map(ThreadId::new).collect()
    }

    #[test]
    fn test_every_name_resolves() {
        for name in POLICY_NAMES {
            let config = SchedulerConfig {
                policy: (*name).to_owned(),
                seed: 1,
            };
            assert_eq!(policy_from_config(&config).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_unknown_name() {
        let config = SchedulerConfig {
            policy: "fifo".into(),
            seed: 0,
        };
        assert!(matches!(policy_from_config(&config), Err(ConfigError::UnknownPolicy(_))));
    }

    #[test]
    fn test_round_robin_starts_after_current() {
        let ks = kernel(4);
        let out = RoundRobin.filter(&ks, Some(ThreadId(1)), ids(&[0, 1, 2, 3]));
        assert_eq!(out, ids(&[2, 3, 0, 1]));

        let wrap = RoundRobin.filter(&ks, Some(ThreadId(3)), ids(&[0, 1, 2, 3]));
        assert_eq!(wrap, ids(&[0, 1, 2, 3]));
    }

    #[test]
    fn test_priority_keeps_highest() {
        let mut ks = kernel(3);
        ks.threads_mut().get_mut(ThreadId(1)).set_priority(9);
        ks.threads_mut().get_mut(ThreadId(2)).set_priority(9);
        assert_eq!(Priority.filter(&ks, None, ids(&[0, 1, 2])), ids(&[1, 2]));
    }

    #[test]
    fn test_randomized_is_a_reproducible_permutation() {
        let ks = kernel(5);
        let a = Randomized::new(7).filter(&ks, None, ids(&[0, 1, 2, 3, 4]));
        let b = Randomized::new(7).filter(&ks, None, ids(&[0, 1, 2, 3, 4]));
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, ids(&[0, 1, 2, 3, 4]));
    }
}
