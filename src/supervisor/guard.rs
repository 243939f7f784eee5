//! Reentry guard: at most one supervision per request.
//!
//! The guard is an identity-keyed weak table owned by the supervisor rather
//! than a marker stored on the request. Entries for requests that have been
//! dropped are pruned on the next `mark`.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::source::{RequestId, RequestSource};

#[derive(Default)]
pub struct ReentryGuard {
    marks: RefCell<HashMap<RequestId, Weak<dyn Any>>>,
}

impl ReentryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `request` as supervised. Returns `false` if it already was.
    pub fn mark<R: RequestSource>(&self, request: &Rc<R>) -> bool {
        let id = request.id();
        let mut marks = self.marks.borrow_mut();
        marks.retain(|_, alive| alive.strong_count() > 0);

        if marks.contains_key(&id) {
            return false;
        }
        let erased: Rc<dyn Any> = Rc::clone(request) as Rc<dyn Any>;
        marks.insert(id, Rc::downgrade(&erased));
        true
    }

    pub fn is_marked(&self, id: RequestId) -> bool {
        self.marks
            .borrow()
            .get(&id)
            .is_some_and(|alive| alive.strong_count() > 0)
    }

    /// Number of live requests currently marked.
    pub fn len(&self) -> usize {
        self.marks
            .borrow()
            .values()
            .filter(|alive| alive.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FakeRequest, FakeSocket};

    fn request() -> Rc<FakeRequest> {
        Rc::new(FakeRequest::new(&Rc::new(FakeSocket::connecting())))
    }

    #[test]
    fn marks_each_request_once() {
        let guard = ReentryGuard::new();
        let first = request();
        let second = request();

        assert!(guard.mark(&first));
        assert!(!guard.mark(&first));
        assert!(guard.mark(&second));
        assert!(guard.is_marked(first.id()));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn dropped_requests_are_forgotten() {
        let guard = ReentryGuard::new();
        let req = request();
        let id = req.id();
        assert!(guard.mark(&req));

        drop(req);
        assert!(!guard.is_marked(id));
        assert!(guard.is_empty());
    }
}
