//! Timing subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor arms a phase
//!     → timer.rs (PhaseTimer: primary deadline, then deferred firing)
//!     → scheduler.rs (Scheduler trait: schedule / defer / cancel)
//!     → manual.rs  (deterministic virtual clock, tests and simulation)
//!     → runtime.rs (Tokio LocalSet tasks, production)
//! ```
//!
//! # Design Decisions
//! - No ambient global timer table; the scheduler is passed in explicitly
//! - Breach callbacks run no earlier than the scheduling quantum after the
//!   nominal deadline, so a cancel signal that lands in the same tick wins
//! - Everything here is single-threaded (`Rc`/`Cell`), matching the
//!   turn-based event model of the supervisor

pub mod manual;
pub mod runtime;
pub mod scheduler;
pub mod timer;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;
pub use scheduler::{Scheduler, Task, TimerId};
pub use timer::{add_timeout, PhaseTimer, TimerState};
