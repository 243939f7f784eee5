//! Phase-based request timeouts.
//!
//! A [`TimeoutSupervisor`] attaches to an in-flight request, arms one timer
//! per configured lifecycle phase as the phase becomes active, and on breach
//! emits a [`TimeoutError`] on the request's error channel and aborts it.

pub mod config;
pub mod error;
pub mod observability;
pub mod phase;
pub mod sim;
pub mod source;
pub mod supervisor;
pub mod timing;

pub use config::{LiveConfig, SupervisorConfig};
pub use error::{RequestError, TimeoutError, TransportErrorKind};
pub use phase::{DelayConfig, Phase};
pub use source::ConnectionContext;
pub use supervisor::{CancelHandle, TimeoutSupervisor};
pub use timing::{ManualScheduler, Scheduler, TokioScheduler};
