//! The idempotent detach handle returned by `attach`.

use std::fmt;
use std::rc::Rc;

use crate::phase::Phase;

/// Type-erased view of one supervision, so the handle is not generic over
/// the request type.
pub(crate) trait Detach {
    fn cancel_all(&self);
    fn is_detached(&self) -> bool;
    fn pending_phases(&self) -> Vec<Phase>;
    fn armed_history(&self) -> Vec<Phase>;
    fn live_subscriptions(&self) -> usize;
}

/// Cancels every timer and releases every subscription one `attach` made.
///
/// Dropping the handle does not detach; the supervision keeps running until
/// the response ends, the request errors, or `cancel_all` is called. Once
/// the request itself is dropped, the supervision detaches on its own.
#[derive(Clone)]
pub struct CancelHandle {
    target: Option<Rc<dyn Detach>>,
}

impl CancelHandle {
    pub(crate) fn new(target: Rc<dyn Detach>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// A handle that controls nothing.
    pub fn noop() -> Self {
        Self { target: None }
    }

    /// Synchronously cancel all armed timers and release all subscriptions.
    /// Safe to call any number of times; never fails.
    pub fn cancel_all(&self) {
        if let Some(target) = &self.target {
            target.cancel_all();
        }
    }

    /// True when this handle was returned for a request that was already
    /// supervised, and therefore controls nothing.
    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    pub fn is_detached(&self) -> bool {
        self.target.as_ref().map_or(true, |target| target.is_detached())
    }

    /// Phases whose timers are currently armed.
    pub fn pending_phases(&self) -> Vec<Phase> {
        self.target
            .as_ref()
            .map(|target| target.pending_phases())
            .unwrap_or_default()
    }

    /// Every phase armed so far, in arming order.
    pub fn armed_history(&self) -> Vec<Phase> {
        self.target
            .as_ref()
            .map(|target| target.armed_history())
            .unwrap_or_default()
    }

    /// Subscriptions installed by this supervision and not yet released.
    pub fn live_subscriptions(&self) -> usize {
        self.target
            .as_ref()
            .map_or(0, |target| target.live_subscriptions())
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("noop", &self.is_noop())
            .field("detached", &self.is_detached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_handle_is_inert() {
        let handle = CancelHandle::noop();
        handle.cancel_all();
        handle.cancel_all();
        assert!(handle.is_noop());
        assert!(handle.is_detached());
        assert!(handle.pending_phases().is_empty());
        assert_eq!(handle.live_subscriptions(), 0);
    }
}
