//! Timeout supervision subsystem.
//!
//! # Data Flow
//! ```text
//! attach(request, delays, context)
//!     → guard.rs (reentry: second attach gets a no-op handle)
//!     → supervisor.rs (subscribe to error/response/socket, arm request timer)
//!
//! Lifecycle signal
//!     → arm or disarm the phase timers it starts or ends
//!
//! Breach
//!     → TimeoutError on the request's error channel → abort request
//!     → error signal → cancel_all
//!
//! Response end / external cancel
//!     → handle.rs (CancelHandle::cancel_all: idempotent, total)
//! ```
//!
//! # Design Decisions
//! - A timer is only created for a configured phase that becomes active
//! - Only listeners this supervision installed are ever removed
//! - Teardown errors after the response arrived do not detach
//! - First breach wins; later breaches of the same request are dropped

pub mod guard;
pub mod handle;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use guard::ReentryGuard;
pub use handle::CancelHandle;
pub use supervisor::TimeoutSupervisor;
