//! Krepis Model Checker Core
//!
//! # Overview
//!
//! `krepis-mc` holds the state machinery of an explicit-state model
//! checker for multithreaded programs: a snapshot-able heap and thread
//! model, choice generators for every scheduling-relevant operation, and
//! canonical state fingerprints for state matching. Instruction semantics
//! are supplied by the caller through [`Program`].
//!
//! ```text
//!   Program::step ──> KernelState ──> Scheduler::create_* ──> ChoiceGenerator
//!        ↑                │                                       │
//!        │                └──> FilteringSerializer ──> StateTable │
//!        │                                                        │
//!        └──────────────── DfsExplorer (restore + advance) <──────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use krepis_mc::config::CheckerConfig;
//! use krepis_mc::domain::{
//!     ClassDescriptor, DfsExplorer, KernelState, MethodId, Program, StackFrame, StepContext,
//!     ThreadId, TransitionOutcome, ValueKind,
//! };
//! use krepis_mc::error::SearchError;
//!
//! /// Two threads each store their id into `Shared.x`
//! struct Race;
//!
//! impl Program for Race {
//!     fn init(&self, ks: &mut KernelState) -> Result<(), SearchError> {
//!         let shared = ks.register_class(
//!             ClassDescriptor::builder("Shared").static_field("x", ValueKind::Int).build(),
//!         );
//!         ks.load_class(shared);
//!         for i in 0..2 {
//!             let t = ks.create_thread(format!("t{i}"), None, None);
//!             ks.start_thread(t, StackFrame::new(MethodId::new(0), 0))?;
//!         }
//!         Ok(())
//!     }
//!
//!     fn step(&self, cx: &mut StepContext<'_>, t: ThreadId) -> Result<TransitionOutcome, SearchError> {
//!         let shared = cx.ks.load_class_named("Shared")?;
//!         cx.ks.set_static_int(shared, "x", t.as_usize() as i32 + 1)?;
//!         cx.ks.terminate_thread(t)?;
//!         Ok(cx.scheduler.create_terminate(cx.ks, t).into())
//!     }
//! }
//!
//! let outcome = DfsExplorer::new(Race, &CheckerConfig::default())?.run()?;
//! assert_eq!(outcome.end_states.len(), 2);
//! # Ok::<(), SearchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod domain;
pub mod error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub use config::CheckerConfig;
pub use domain::{
    DfsExplorer, KernelMemento, KernelState, ObjRef, Program, Scheduler, SearchOutcome, StepContext,
    ThreadId, TransitionOutcome,
};
pub use error::{ConfigError, KernelError, SearchError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
