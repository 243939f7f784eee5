//! In-memory request, socket and response sources.

use std::cell::{Cell, RefCell};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::{LookupError, RequestError, TimeoutError};
use crate::source::{
    Emitter, EventSource, IdleRelease, Listener, ListenerId, RequestEvent, RequestId,
    RequestSource, ResponseEvent, ResponseSource, SocketEvent, SocketSource,
};
use crate::timing::{Scheduler, TimerId};

/// Native idle timeout of a fake connection, restarted on activity.
struct IdleTimeout {
    listeners: Emitter<()>,
    threshold: Cell<Option<Duration>>,
    pending: Cell<Option<TimerId>>,
    scheduler: Rc<dyn Scheduler>,
}

impl IdleTimeout {
    fn restart(self: &Rc<Self>) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel(id);
        }
        let Some(threshold) = self.threshold.get() else {
            return;
        };
        let idle: Weak<IdleTimeout> = Rc::downgrade(self);
        let id = self.scheduler.schedule(
            threshold,
            Box::new(move || {
                if let Some(idle) = idle.upgrade() {
                    idle.pending.set(None);
                    idle.listeners.emit(&());
                }
            }),
        );
        self.pending.set(Some(id));
    }

    /// Remove one listener; the countdown stops once nobody listens.
    fn remove(&self, id: ListenerId) -> bool {
        let removed = self.listeners.unsubscribe(id);
        if self.listeners.listener_count() == 0 {
            if let Some(pending) = self.pending.take() {
                self.scheduler.cancel(pending);
            }
        }
        removed
    }
}

/// A fake transport connection. Shared by every request that reuses it.
pub struct FakeSocket {
    events: Emitter<SocketEvent>,
    connecting: Cell<bool>,
    resolved: Cell<Option<IpAddr>>,
    remote_addr: Cell<Option<SocketAddr>>,
    unix_path: Option<PathBuf>,
    idle: Option<Rc<IdleTimeout>>,
}

impl FakeSocket {
    /// A fresh socket that still has to resolve and connect.
    pub fn connecting() -> Self {
        Self {
            events: Emitter::new(),
            connecting: Cell::new(true),
            resolved: Cell::new(None),
            remote_addr: Cell::new(None),
            unix_path: None,
            idle: None,
        }
    }

    /// A pooled socket that is already connected to `addr`.
    pub fn established(addr: SocketAddr) -> Self {
        let socket = Self::connecting();
        socket.connecting.set(false);
        socket.resolved.set(Some(addr.ip()));
        socket.remote_addr.set(Some(addr));
        socket
    }

    pub fn with_unix_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_path = Some(path.into());
        self
    }

    /// A connecting socket whose remote address is already known.
    pub fn with_remote_addr(self, addr: SocketAddr) -> Self {
        self.remote_addr.set(Some(addr));
        self
    }

    /// Give the socket a native idle timeout driven by `scheduler`.
    pub fn with_idle_timeout(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.idle = Some(Rc::new(IdleTimeout {
            listeners: Emitter::new(),
            threshold: Cell::new(None),
            pending: Cell::new(None),
            scheduler,
        }));
        self
    }

    /// Finish name resolution successfully.
    pub fn resolve(&self, ip: IpAddr) {
        self.resolved.set(Some(ip));
        self.signal(SocketEvent::Lookup(Ok(ip)));
    }

    /// Finish name resolution with an error.
    pub fn fail_lookup(&self, host: &str, message: &str) {
        self.signal(SocketEvent::Lookup(Err(LookupError {
            host: host.to_string(),
            message: message.to_string(),
        })));
    }

    pub fn connect(&self, port: u16) {
        self.connecting.set(false);
        if let Some(ip) = self.resolved.get() {
            self.remote_addr.set(Some(SocketAddr::new(ip, port)));
        }
        self.signal(SocketEvent::Connect);
    }

    pub fn secure_connect(&self) {
        self.signal(SocketEvent::SecureConnect);
    }

    /// Listeners currently subscribed to socket signals.
    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    /// Listeners currently installed on the native idle timeout.
    pub fn idle_listener_count(&self) -> usize {
        self.idle.as_ref().map_or(0, |idle| idle.listeners.listener_count())
    }

    pub fn supports_idle_timeout(&self) -> bool {
        self.idle.is_some()
    }

    /// Record activity, restarting the idle countdown.
    pub fn touch(&self) {
        if let Some(idle) = &self.idle {
            idle.restart();
        }
    }

    fn signal(&self, event: SocketEvent) {
        self.touch();
        self.events.emit(&event);
    }

    fn add_idle_listener(&self, threshold: Duration, listener: Listener<()>) -> Option<IdleRelease> {
        let idle = self.idle.as_ref()?;
        let id = idle.listeners.subscribe(listener);
        idle.threshold.set(Some(threshold));
        idle.restart();

        let idle: Weak<IdleTimeout> = Rc::downgrade(idle);
        Some(Box::new(move || {
            if let Some(idle) = idle.upgrade() {
                idle.remove(id);
            }
        }))
    }
}

impl EventSource<SocketEvent> for FakeSocket {
    fn subscribe(&self, listener: Listener<SocketEvent>) -> ListenerId {
        self.events.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl SocketSource for FakeSocket {
    fn is_connecting(&self) -> bool {
        self.connecting.get()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr.get()
    }

    fn unix_path(&self) -> Option<PathBuf> {
        self.unix_path.clone()
    }
}

/// A fake response.
#[derive(Default)]
pub struct FakeResponse {
    events: Emitter<ResponseEvent>,
}

impl FakeResponse {
    pub fn end(&self) {
        self.events.emit(&ResponseEvent::End);
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

impl EventSource<ResponseEvent> for FakeResponse {
    fn subscribe(&self, listener: Listener<ResponseEvent>) -> ListenerId {
        self.events.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl ResponseSource for FakeResponse {}

/// A fake request bound to the socket it will be assigned.
pub struct FakeRequest {
    id: RequestId,
    events: Emitter<RequestEvent>,
    socket: Rc<FakeSocket>,
    errors: RefCell<Vec<RequestError>>,
    aborted: Cell<bool>,
}

impl FakeRequest {
    pub fn new(socket: &Rc<FakeSocket>) -> Self {
        Self {
            id: RequestId::new(),
            events: Emitter::new(),
            socket: Rc::clone(socket),
            errors: RefCell::new(Vec::new()),
            aborted: Cell::new(false),
        }
    }

    pub fn socket(&self) -> &Rc<FakeSocket> {
        &self.socket
    }

    /// Emit `socket` with the bound socket.
    pub fn assign_socket(&self) {
        self.socket.touch();
        let socket: Rc<dyn SocketSource> = self.socket.clone();
        self.events.emit(&RequestEvent::Socket(socket));
    }

    pub fn complete_upload(&self) {
        self.socket.touch();
        self.events.emit(&RequestEvent::UploadComplete);
    }

    /// Emit `response` and return the response so the caller can end it.
    pub fn respond(&self) -> Rc<FakeResponse> {
        self.socket.touch();
        let response = Rc::new(FakeResponse::default());
        let handle: Rc<dyn ResponseSource> = response.clone();
        self.events.emit(&RequestEvent::Response(handle));
        response
    }

    /// Every error delivered on the error channel, in order.
    pub fn errors(&self) -> Vec<RequestError> {
        self.errors.borrow().clone()
    }

    /// The timeouts among [`FakeRequest::errors`].
    pub fn timeouts(&self) -> Vec<TimeoutError> {
        self.errors
            .borrow()
            .iter()
            .filter_map(RequestError::as_timeout)
            .copied()
            .collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

impl EventSource<RequestEvent> for FakeRequest {
    fn subscribe(&self, listener: Listener<RequestEvent>) -> ListenerId {
        self.events.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl RequestSource for FakeRequest {
    fn id(&self) -> RequestId {
        self.id
    }

    fn fail(&self, error: RequestError) {
        self.errors.borrow_mut().push(error.clone());
        self.events.emit(&RequestEvent::Error(error));
    }

    fn abort(&self) {
        self.aborted.set(true);
    }

    fn set_idle_timeout(&self, threshold: Duration, listener: Listener<()>) -> Option<IdleRelease> {
        self.socket.add_idle_listener(threshold, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ManualScheduler;

    #[test]
    fn idle_timeout_fires_after_inactivity() {
        let clock = Rc::new(ManualScheduler::new());
        let socket = Rc::new(FakeSocket::connecting().with_idle_timeout(clock.clone()));
        let request = FakeRequest::new(&socket);

        let fired = Rc::new(Cell::new(0));
        let count = Rc::clone(&fired);
        let release = request
            .set_idle_timeout(Duration::from_millis(10), Rc::new(move |_: &()| count.set(count.get() + 1)))
            .unwrap();

        clock.advance(Duration::from_millis(8));
        socket.connect(80);
        clock.advance(Duration::from_millis(8));
        assert_eq!(fired.get(), 0);

        clock.advance(Duration::from_millis(2));
        assert_eq!(fired.get(), 1);

        release();
        assert_eq!(socket.idle_listener_count(), 0);
    }

    #[test]
    fn idle_release_outlives_request() {
        let clock = Rc::new(ManualScheduler::new());
        let socket = Rc::new(FakeSocket::connecting().with_idle_timeout(clock.clone()));
        let request = FakeRequest::new(&socket);
        let release = request
            .set_idle_timeout(Duration::from_millis(10), Rc::new(|_: &()| {}))
            .unwrap();
        assert_eq!(clock.pending(), 1);

        drop(request);
        release();

        assert_eq!(socket.idle_listener_count(), 0);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn socket_without_idle_primitive_declines() {
        let socket = Rc::new(FakeSocket::connecting());
        let request = FakeRequest::new(&socket);
        assert!(request
            .set_idle_timeout(Duration::from_millis(1), Rc::new(|_: &()| {}))
            .is_none());
        assert!(!socket.supports_idle_timeout());
    }

    #[test]
    fn fail_records_and_emits() {
        let socket = Rc::new(FakeSocket::connecting());
        let request = FakeRequest::new(&socket);
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        request.subscribe(Rc::new(move |event: &RequestEvent| {
            if matches!(event, RequestEvent::Error(_)) {
                flag.set(true);
            }
        }));

        request.fail(RequestError::transport(
            crate::error::TransportErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(seen.get());
        assert_eq!(request.errors().len(), 1);
        assert!(request.timeouts().is_empty());
    }
}
