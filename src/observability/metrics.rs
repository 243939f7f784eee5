//! Supervisor metrics.
//!
//! # Metrics
//! - `phase_timeout_armed_total` (counter): timers armed, by phase
//! - `phase_timeout_breaches_total` (counter): timeouts raised, by phase
//! - `phase_timeout_detached_total` (counter): supervisions detached
//! - `phase_timeout_reentry_total` (counter): attaches rejected by the reentry guard
//!
//! Recording goes through the `metrics` facade; the embedding application
//! decides which recorder, if any, to install.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::phase::Phase;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn recording on or off process-wide (`observability.metrics_enabled`).
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_armed(phase: Phase) {
    if is_enabled() {
        metrics::counter!("phase_timeout_armed_total", "phase" => phase.as_str()).increment(1);
    }
}

pub fn record_breach(phase: Phase) {
    if is_enabled() {
        metrics::counter!("phase_timeout_breaches_total", "phase" => phase.as_str()).increment(1);
    }
}

pub fn record_detached() {
    if is_enabled() {
        metrics::counter!("phase_timeout_detached_total").increment(1);
    }
}

pub fn record_reentry() {
    if is_enabled() {
        metrics::counter!("phase_timeout_reentry_total").increment(1);
    }
}
