//! Simulation harness.
//!
//! # Data Flow
//! ```text
//! Scenario (signal offsets, connection shape)
//!     → scenario.rs schedules each signal on a ManualScheduler
//!     → fake.rs sources emit the signals to the attached supervisor
//!     → Outcome (breach, phases armed, leftovers after cancel_all)
//! ```
//!
//! # Design Decisions
//! - Fakes implement the same traits a real transport does
//! - The socket owns the idle timeout so reuse across requests is observable
//! - Everything runs on virtual time; no sleeps

pub mod fake;
pub mod scenario;

pub use fake::{FakeRequest, FakeResponse, FakeSocket};
pub use scenario::{BreachReport, Outcome, Scenario};
