//! Depth-first exploration driver
//!
//! # Overview
//!
//! [`DfsExplorer`] enumerates every interleaving of a [`Program`] by walking
//! the tree of choice generators depth-first. Each tree node keeps the
//! kernel memento and fingerprint of the state in which its generator was
//! created; every sibling choice starts from that memento.
//!
//! ```text
//!   S0 ── root[T0,T1] ──┬── T0 ──> S1 ── cg[T1] ── T1 ──> E1   (end state)
//!                       │
//!                       └── T1 ──> S2 ── cg[T0] ── T0 ──> E1'  (seen: pruned)
//! ```
//!
//! # Algorithm
//!
//! 1. Initialize the program, fingerprint the initial state, create the root
//!    generator.
//! 2. Take the next choice of the newest generator with choices left;
//!    restore its memento and let the chosen thread run one transition.
//! 3. GC (optional), fingerprint, look the state up in the [`StateTable`].
//! 4. Seen states are pruned. New states either push the generator the
//!    transition ended with, or are terminal: a deadlock when live threads
//!    remain blocked, an end state otherwise.
//! 5. Exhausted generators are popped (backtrack) until the tree is empty
//!    or a budget runs out.
//!
//! Transitions must be deterministic: every piece of program state lives in
//! the [`KernelState`], so a restored memento replays identically.

use crate::config::{CheckerConfig, SearchConfig};
use crate::domain::choice::{ChoiceGenerator, ChoicePath};
use crate::domain::kernel::{KernelMemento, KernelState};
use crate::domain::scheduler::Scheduler;
use crate::domain::serializer::{
    state_table_from_name, FilteringSerializer, StateSerializer, StateTable, StoringData,
};
use crate::domain::threads::ThreadId;
use crate::error::SearchError;
use std::fmt;
use tracing::{debug, info, trace, warn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Program Interface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a transition ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// A scheduling decision follows
    Branch(ChoiceGenerator),
    /// No thread can or needs to continue
    Halt,
}

impl From<Option<ChoiceGenerator>> for TransitionOutcome {
    fn from(cg: Option<ChoiceGenerator>) -> Self {
        cg.map_or(Self::Halt, Self::Branch)
    }
}

/// Everything a transition may touch
pub struct StepContext<'a> {
    /// Program state
    pub ks: &'a mut KernelState,
    /// Choice-generator factory
    pub scheduler: &'a Scheduler,
    /// Decisions leading to the current state
    pub path: &'a ChoicePath,
    data_choice: Option<ThreadId>,
}

impl StepContext<'_> {
    /// Choice of a non-scheduling generator (e.g. the waiter a `notify`
    /// wakes), delivered to the generator's creator when it resumes
    pub const fn data_choice(&self) -> Option<ThreadId> {
        self.data_choice
    }
}

/// The modeled program: instruction execution is supplied by the caller
///
/// Implementations must keep all mutable state in the [`KernelState`]
/// (frames, heap, statics); the explorer replays transitions from restored
/// mementos.
pub trait Program {
    /// Build the initial state: classes, main thread, entry frame
    ///
    /// # Errors
    ///
    /// Any failure aborts the search before it starts.
    fn init(&self, ks: &mut KernelState) -> Result<(), SearchError>;

    /// Run `thread` until it reaches the next scheduling decision or no
    /// thread can continue
    ///
    /// # Errors
    ///
    /// Failures abort the search.
    fn step(&self, cx: &mut StepContext<'_>, thread: ThreadId) -> Result<TransitionOutcome, SearchError>;

    /// Check a property of a reached state; `Some(message)` is a violation
    #[allow(unused_variables)]
    fn check(&self, ks: &KernelState) -> Option<String> {
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Counters of one exploration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Transitions executed
    pub transitions: u64,
    /// Distinct states reached, including the initial state
    pub new_states: u64,
    /// Transitions that ended in an already visited state
    pub revisited: u64,
    /// Generators popped
    pub backtracks: u64,
    /// Deepest decision stack
    pub max_depth: usize,
    /// New states not expanded because of `max_depth`
    pub depth_limited: u64,
    /// Objects reclaimed by GC between transitions
    pub reclaimed: u64,
}

/// A state violating the program's property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Message returned by [`Program::check`]
    pub message: String,
    /// Choices leading to the state
    pub trace: Vec<ThreadId>,
}

/// Why a search stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// `search.max_states` reached
    MaxStates,
    /// `search.max_transitions` reached
    MaxTransitions,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxStates => f.write_str("state budget exhausted"),
            Self::MaxTransitions => f.write_str("transition budget exhausted"),
        }
    }
}

/// Result of [`DfsExplorer::run`]
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Fingerprints of distinct end states, in discovery order
    pub end_states: Vec<u64>,
    /// Traces into deadlocked states
    pub deadlocks: Vec<Vec<ThreadId>>,
    /// Property violations
    pub violations: Vec<Violation>,
    /// Traces on which a thread blocked inside an atomic section
    pub blocked_in_atomic: Vec<Vec<ThreadId>>,
    /// Set when a budget stopped the search
    pub aborted: Option<AbortReason>,
    /// Counters
    pub stats: SearchStats,
}

impl SearchOutcome {
    /// Whether the search found neither deadlocks nor violations
    pub fn is_clean(&self) -> bool {
        self.deadlocks.is_empty() && self.violations.is_empty()
    }

    /// Whether the whole state space was covered
    pub const fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Explorer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backtrack point of one generator on the path
struct Node {
    memento: KernelMemento,
    fingerprint: StoringData,
    blocked_in_atomic: bool,
}

/// Depth-first explorer
pub struct DfsExplorer<P: Program> {
    program: P,
    ks: KernelState,
    scheduler: Scheduler,
    serializer: FilteringSerializer,
    table: Box<dyn StateTable>,
    limits: SearchConfig,
}

impl<P: Program> DfsExplorer<P> {
    /// Create an explorer with a fresh kernel state
    ///
    /// # Errors
    ///
    /// Configuration errors.
    pub fn new(program: P, config: &CheckerConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let ks = KernelState::builder().config(config).build();
        Self::with_kernel(program, ks, config)
    }

    /// Create an explorer over a prepared kernel state
    ///
    /// # Errors
    ///
    /// Configuration errors, or a serializer already attached to `ks`.
    pub fn with_kernel(program: P, ks: KernelState, config: &CheckerConfig) -> Result<Self, SearchError> {
        let serializer = FilteringSerializer::attach(&ks)?;
        Ok(Self {
            program,
            ks,
            scheduler: Scheduler::new(config)?,
            serializer,
            table: state_table_from_name(&config.search.state_table)?,
            limits: config.search.clone(),
        })
    }

    /// Kernel state; after [`run`](Self::run) it holds the initial state
    pub const fn kernel(&self) -> &KernelState {
        &self.ks
    }

    /// Visited-state table
    pub fn table(&self) -> &dyn StateTable {
        self.table.as_ref()
    }

    /// Explore the whole state space, or until a budget runs out
    ///
    /// # Errors
    ///
    /// Failures of [`Program::init`] or [`Program::step`].
    pub fn run(&mut self) -> Result<SearchOutcome, SearchError> {
        info!(
            state_table = self.table.name(),
            policy = self.scheduler.policy().name(),
            "🔍 Exploration started"
        );
        let mut outcome = SearchOutcome::default();

        self.program.init(&mut self.ks)?;
        self.collect_garbage(&mut outcome.stats);
        let root_memento = self.ks.snapshot();
        let root_fp = self.serializer.fingerprint(&self.ks);
        self.table.visit(&root_fp);
        outcome.stats.new_states += 1;

        let mut path = ChoicePath::new();
        let mut nodes: Vec<Node> = Vec::new();
        match self.scheduler.create_root(&mut self.ks) {
            Some(root) => {
                self.ks.observers_mut().choice_generator_set(&root);
                path.push(root);
                outcome.stats.max_depth = path.depth();
                nodes.push(Node {
                    memento: root_memento.clone(),
                    fingerprint: root_fp,
                    blocked_in_atomic: self.ks.is_blocked_in_atomic(),
                });
            }
            None => self.record_terminal(&path, &mut outcome, root_fp),
        }

        while let Some(node) = nodes.last() {
            if let Some(reason) = self.budget_exhausted(&outcome.stats) {
                warn!(%reason, transitions = outcome.stats.transitions, "Exploration aborted");
                outcome.aborted = Some(reason);
                break;
            }

            let Some(cg) = path.top_mut() else { break };
            let Some(choice) = cg.advance() else {
                if let Some(done) = path.pop() {
                    self.ks.observers_mut().choice_generator_processed(&done);
                }
                nodes.pop();
                outcome.stats.backtracks += 1;
                self.ks.observers_mut().state_backtracked(path.depth());
                continue;
            };
            let (runner, data_choice) = if cg.is_scheduling_point() {
                (choice, None)
            } else {
                (cg.creator().unwrap_or(choice), Some(choice))
            };
            let parent_blocked = node.blocked_in_atomic;
            self.ks.restore(&node.memento);
            self.serializer.prime(&self.ks, node.fingerprint.clone());
            if let Some(cg) = path.top() {
                self.ks.observers_mut().choice_generator_advanced(cg);
            }
            trace!(thread = %runner, depth = path.depth(), "transition");

            let next = {
                let mut cx = StepContext {
                    ks: &mut self.ks,
                    scheduler: &self.scheduler,
                    path: &path,
                    data_choice,
                };
                self.program.step(&mut cx, runner)?
            };
            outcome.stats.transitions += 1;
            self.collect_garbage(&mut outcome.stats);

            let fp = self.serializer.fingerprint(&self.ks);
            let visit = self.table.visit(&fp);
            self.ks.observers_mut().state_advanced(path.depth(), visit.is_new());
            if !visit.is_new() {
                outcome.stats.revisited += 1;
                continue;
            }
            outcome.stats.new_states += 1;

            let blocked = self.ks.is_blocked_in_atomic();
            if blocked && !parent_blocked {
                outcome.blocked_in_atomic.push(path.trace());
            }
            if let Some(message) = self.program.check(&self.ks) {
                warn!(%message, "property violated");
                outcome.violations.push(Violation {
                    message,
                    trace: path.trace(),
                });
                continue;
            }

            match next {
                TransitionOutcome::Branch(cg) => {
                    if self.limits.max_depth.is_some_and(|max| path.depth() >= max) {
                        outcome.stats.depth_limited += 1;
                        continue;
                    }
                    self.ks.observers_mut().choice_generator_set(&cg);
                    path.push(cg);
                    nodes.push(Node {
                        memento: self.ks.snapshot(),
                        fingerprint: fp,
                        blocked_in_atomic: blocked,
                    });
                    outcome.stats.max_depth = outcome.stats.max_depth.max(path.depth());
                }
                TransitionOutcome::Halt => self.record_terminal(&path, &mut outcome, fp),
            }
        }

        self.ks.restore(&root_memento);
        debug!("kernel state restored to the initial state");
        info!(
            states = outcome.stats.new_states,
            transitions = outcome.stats.transitions,
            end_states = outcome.end_states.len(),
            deadlocks = outcome.deadlocks.len(),
            violations = outcome.violations.len(),
            "✅ Exploration finished"
        );
        Ok(outcome)
    }

    fn record_terminal(&self, path: &ChoicePath, outcome: &mut SearchOutcome, fp: StoringData) {
        if self.ks.is_deadlocked() {
            warn!(depth = path.depth(), "deadlock");
            outcome.deadlocks.push(path.trace());
        } else {
            outcome.end_states.push(fp.hash());
        }
    }

    fn collect_garbage(&mut self, stats: &mut SearchStats) {
        if self.limits.gc_after_transition {
            stats.reclaimed += self.ks.gc().reclaimed as u64;
        }
    }

    fn budget_exhausted(&self, stats: &SearchStats) -> Option<AbortReason> {
        if self.limits.max_transitions.is_some_and(|max| stats.transitions >= max as u64) {
            return Some(AbortReason::MaxTransitions);
        }
        if self.limits.max_states.is_some_and(|max| self.table.len() >= max) {
            return Some(AbortReason::MaxStates);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::heap::{ClassDescriptor, ClassId, ValueKind};
    use crate::domain::identity::MethodId;
    use crate::domain::threads::StackFrame;

    /// Every thread stores its value into `Shared.x` and terminates
    struct Writers {
        values: Vec<i32>,
    }

    fn shared(ks: &KernelState) -> ClassId {
        ks.register_class(
            ClassDescriptor::builder("Shared")
                .static_field("x", ValueKind::Int)
                .build(),
        )
    }

    impl Program for Writers {
        fn init(&self, ks: &mut KernelState) -> Result<(), SearchError> {
            let class = shared(ks);
            ks.load_class(class);
            for (i, _) in self.values.iter().enumerate() {
                let t = ks.create_thread(format!("writer-{i}"), None, None);
                ks.start_thread(t, StackFrame::new(MethodId::new(i as u32), 0))?;
            }
            Ok(())
        }

        fn step(&self, cx: &mut StepContext<'_>, thread: ThreadId) -> Result<TransitionOutcome, SearchError> {
            let class = shared(cx.ks);
            cx.ks.set_static_int(class, "x", self.values[thread.as_usize()])?;
            cx.ks.terminate_thread(thread)?;
            Ok(cx.scheduler.create_terminate(cx.ks, thread).into())
        }
    }

    /// Fails whenever `Shared.x` holds `bad`
    struct Forbidden {
        inner: Writers,
        bad: i32,
    }

    impl Program for Forbidden {
        fn init(&self, ks: &mut KernelState) -> Result<(), SearchError> {
            self.inner.init(ks)
        }

        fn step(&self, cx: &mut StepContext<'_>, thread: ThreadId) -> Result<TransitionOutcome, SearchError> {
            self.inner.step(cx, thread)
        }

        fn check(&self, ks: &KernelState) -> Option<String> {
            let class = ks.classes().lookup("Shared")?;
            (ks.get_static_int(class, "x").ok()? == self.bad).then(|| format!("x == {}", self.bad))
        }
    }

    fn explore(program: impl Program, config: &CheckerConfig) -> SearchOutcome {
        DfsExplorer::new(program, config).unwrap().run().unwrap()
    }

    #[test]
    fn test_distinct_writes_give_two_end_states() {
        let out = explore(Writers { values: vec![1, 2] }, &CheckerConfig::default());
        assert_eq!(out.end_states.len(), 2);
        assert_eq!(out.stats.transitions, 4);
        assert_eq!(out.stats.revisited, 0);
        assert!(out.is_clean());
        assert!(out.is_complete());
    }

    #[test]
    fn test_equal_writes_collapse() {
        let out = explore(Writers { values: vec![7, 7] }, &CheckerConfig::default());
        assert_eq!(out.end_states.len(), 1);
        assert_eq!(out.stats.revisited, 1);
        assert_eq!(out.stats.new_states, 4);
    }

    #[test]
    fn test_exact_table_agrees_with_hashed() {
        let mut config = CheckerConfig::default();
        config.search.state_table = "exact".to_owned();
        let out = explore(Writers { values: vec![1, 2, 3] }, &config);
        assert_eq!(out.end_states.len(), 3);
        assert_eq!(out.stats.new_states, 1 + 3 + 6 + 3);
    }

    #[test]
    fn test_empty_program_is_one_end_state() {
        let out = explore(Writers { values: vec![] }, &CheckerConfig::default());
        assert_eq!(out.end_states.len(), 1);
        assert_eq!(out.stats.transitions, 0);
    }

    #[test]
    fn test_violation_is_reported_with_trace() {
        let program = Forbidden {
            inner: Writers { values: vec![1, 2] },
            bad: 2,
        };
        let out = explore(program, &CheckerConfig::default());
        assert_eq!(out.violations.len(), 2);
        assert_eq!(out.violations[0].message, "x == 2");
        assert_eq!(out.violations[0].trace, vec![ThreadId::new(0), ThreadId::new(1)]);
        assert_eq!(out.violations[1].trace, vec![ThreadId::new(1)]);
        assert!(out.end_states.is_empty());
        assert!(!out.is_clean());
    }

    #[test]
    fn test_transition_budget_aborts() {
        let mut config = CheckerConfig::default();
        config.search.max_transitions = Some(2);
        let out = explore(Writers { values: vec![1, 2] }, &config);
        assert_eq!(out.aborted, Some(AbortReason::MaxTransitions));
        assert_eq!(out.stats.transitions, 2);
        assert!(!out.is_complete());
    }

    #[test]
    fn test_state_budget_aborts() {
        let mut config = CheckerConfig::default();
        config.search.max_states = Some(3);
        let out = explore(Writers { values: vec![1, 2] }, &config);
        assert_eq!(out.aborted, Some(AbortReason::MaxStates));
    }

    #[test]
    fn test_depth_limit_cuts_branches() {
        let mut config = CheckerConfig::default();
        config.search.max_depth = Some(1);
        let out = explore(Writers { values: vec![1, 2] }, &config);
        assert!(out.end_states.is_empty());
        assert_eq!(out.stats.depth_limited, 2);
        assert_eq!(out.stats.max_depth, 1);
    }

    #[test]
    fn test_kernel_is_restored_to_initial_state() {
        let mut explorer = DfsExplorer::new(Writers { values: vec![1, 2] }, &CheckerConfig::default()).unwrap();
        explorer.run().unwrap();
        let ks = explorer.kernel();
        assert_eq!(ks.threads().runnable_count(), 2);
        let class = ks.classes().lookup("Shared").unwrap();
        assert_eq!(ks.get_static_int(class, "x").unwrap(), 0);
        assert_eq!(explorer.table().len(), 5);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let mut config = CheckerConfig::default();
        config.scheduler.policy = "lottery".to_owned();
        assert!(matches!(
            DfsExplorer::new(Writers { values: vec![] }, &config),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_outcome_from_option() {
        assert_eq!(TransitionOutcome::from(None), TransitionOutcome::Halt);
        let cg = ChoiceGenerator::root(vec![ThreadId::new(0)]);
        assert_eq!(TransitionOutcome::from(Some(cg.clone())), TransitionOutcome::Branch(cg));
    }
}
