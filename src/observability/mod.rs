//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor and config subsystems produce:
//!     → tracing events (request_id, phase, threshold_ms fields)
//!     → metrics.rs (counters through the metrics facade)
//!
//! logging.rs installs the subscriber that renders the events:
//!     → stdout, pretty or JSON
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every supervisor event
//! - Metrics are cheap; without an installed recorder they cost nothing

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
