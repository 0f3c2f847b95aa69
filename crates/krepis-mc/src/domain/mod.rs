//! Domain Layer - program state, scheduling choices and state matching
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  KernelState                    Scheduler                   │
//! │  ├─ Heap (Area + GC)            ├─ SchedulingPolicy         │
//! │  ├─ StaticArea                  └─ ChoiceGenerator / Path   │
//! │  ├─ ThreadList (frames)                                     │
//! │  ├─ GlobalIdManager             Serializer                  │
//! │  └─ snapshot / restore          ├─ canonical encode + FP64  │
//! │                                 └─ StateTable               │
//! │                                                             │
//! │                   Search                                    │
//! │                   └─ DfsExplorer<Program>                   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything reachable from [`KernelState`] is path state: it is captured
//! by [`KernelState::snapshot`] and comes back on
//! [`KernelState::restore`]. Scheduler and state table live outside the
//! kernel and survive backtracking.

pub mod bitset;
pub mod boxcache;
pub mod choice;
pub mod heap;
pub mod identity;
pub mod kernel;
pub mod observer;
pub mod scheduler;
pub mod search;
pub mod serializer;
pub mod statics;
pub mod threads;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-exports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub use boxcache::{BoxCache, BoxKind};
pub use choice::{ArrayAccess, CgState, ChoiceGenerator, ChoiceKind, ChoicePath};
pub use heap::{ClassDescriptor, ClassId, GcStats, Heap, ObjRef, ValueKind};
pub use identity::{CreationSite, GlobalId, MethodId};
pub use kernel::{KernelMemento, KernelState, KernelStateBuilder, LockOutcome};
pub use observer::{ObserverSet, TracingObserver, VmObserver};
pub use scheduler::{Scheduler, SchedulingPolicy};
pub use search::{
    AbortReason, DfsExplorer, Program, SearchOutcome, SearchStats, StepContext, TransitionOutcome,
    Violation,
};
pub use serializer::{FilteringSerializer, StateSerializer, StateTable, StoringData, Visit};
pub use threads::{StackFrame, ThreadId, ThreadInfo, ThreadState};
