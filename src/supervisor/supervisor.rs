//! Phase timeout orchestration.
//!
//! One `attach` call creates one supervision. It subscribes to the request's
//! lifecycle signals, arms a timer per configured phase as that phase becomes
//! active, and on breach emits a `TimeoutError` on the request's error
//! channel before aborting the request. The resulting error signal is what
//! detaches the supervision.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::{RequestError, TimeoutError};
use crate::observability::metrics;
use crate::phase::{DelayConfig, Phase};
use crate::source::{
    ConnectionContext, EventSource, Listener, RequestEvent, RequestId, RequestSource,
    ResponseEvent, SocketEvent, SocketSource,
};
use crate::supervisor::guard::ReentryGuard;
use crate::supervisor::handle::{CancelHandle, Detach};
use crate::timing::{add_timeout, PhaseTimer, Scheduler};

type Release = Box<dyn FnOnce()>;

/// Attaches phase timeouts to requests.
///
/// One supervisor is meant to serve every request of a client; the reentry
/// guard only sees requests attached through the same supervisor.
pub struct TimeoutSupervisor {
    scheduler: Rc<dyn Scheduler>,
    guard: ReentryGuard,
}

impl TimeoutSupervisor {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            guard: ReentryGuard::new(),
        }
    }

    pub fn guard(&self) -> &ReentryGuard {
        &self.guard
    }

    /// Supervise `request` with `delays`.
    ///
    /// A request that is already supervised is left untouched and the
    /// returned handle is a no-op (see [`CancelHandle::is_noop`]).
    pub fn attach<R: RequestSource>(
        &self,
        request: &Rc<R>,
        delays: &DelayConfig,
        context: &ConnectionContext,
    ) -> CancelHandle {
        let request_id = request.id();
        if !self.guard.mark(request) {
            tracing::warn!(
                request_id = %request_id,
                "Request already supervised, returning no-op cancel handle"
            );
            metrics::record_reentry();
            return CancelHandle::noop();
        }

        let supervision = Rc::new(Supervision {
            request_id,
            request: Rc::downgrade(request),
            scheduler: Rc::clone(&self.scheduler),
            delays: *delays,
            context: context.clone(),
            idle_fallback: Cell::new(false),
            state: RefCell::new(SupervisorState::default()),
        });
        supervision.install(request);

        tracing::debug!(
            request_id = %request_id,
            phases = ?delays.enabled().map(|(phase, _)| phase).collect::<Vec<_>>(),
            "Supervisor attached"
        );
        CancelHandle::new(supervision)
    }
}

#[derive(Default)]
struct SupervisorState {
    /// Monotonic: once set, nothing is armed or subscribed again.
    detached: bool,
    breached: Option<Phase>,
    response_received: bool,
    next_key: u64,
    timers: HashMap<u64, PhaseTimer>,
    subscriptions: HashMap<u64, Release>,
    armed: Vec<Phase>,
}

struct Supervision<R: RequestSource> {
    request_id: RequestId,
    request: Weak<R>,
    scheduler: Rc<dyn Scheduler>,
    delays: DelayConfig,
    context: ConnectionContext,
    /// Set when the transport has no native idle timeout.
    idle_fallback: Cell<bool>,
    state: RefCell<SupervisorState>,
}

fn is_socket(event: &RequestEvent) -> bool {
    matches!(event, RequestEvent::Socket(_))
}

fn is_upload_complete(event: &RequestEvent) -> bool {
    matches!(event, RequestEvent::UploadComplete)
}

fn is_response(event: &RequestEvent) -> bool {
    matches!(event, RequestEvent::Response(_))
}

fn is_lookup(event: &SocketEvent) -> bool {
    matches!(event, SocketEvent::Lookup(_))
}

fn is_connect(event: &SocketEvent) -> bool {
    matches!(event, SocketEvent::Connect)
}

fn is_secure_connect(event: &SocketEvent) -> bool {
    matches!(event, SocketEvent::SecureConnect)
}

fn is_end(event: &ResponseEvent) -> bool {
    matches!(event, ResponseEvent::End)
}

impl<R: RequestSource> Supervision<R> {
    fn install(self: &Rc<Self>, request: &Rc<R>) {
        self.on(request, |sup, event: &RequestEvent| {
            if let RequestEvent::Error(error) = event {
                sup.on_error(error);
            }
        });

        self.once(request, is_response, |sup, _, event: &RequestEvent| {
            let RequestEvent::Response(response) = event else {
                return;
            };
            sup.state.borrow_mut().response_received = true;
            sup.once(response, is_end, |sup, _, _| sup.on_response_end());
        });

        self.arm(Phase::Request);

        if let Some(threshold_ms) = self.delays.socket {
            self.bind_idle_timeout(request, threshold_ms);
        }

        let needs_socket = self.idle_fallback.get()
            || [Phase::Lookup, Phase::Connect, Phase::SecureConnect, Phase::Send]
                .iter()
                .any(|phase| self.delays.is_enabled(*phase));
        if needs_socket {
            self.once(request, is_socket, |sup, _, event: &RequestEvent| {
                if let RequestEvent::Socket(socket) = event {
                    sup.on_socket(socket);
                }
            });
        }

        if self.delays.is_enabled(Phase::Response) {
            self.once(request, is_upload_complete, |sup, request, _| {
                sup.arm_until(request, Phase::Response, is_response);
            });
        }

        if self.delays.is_enabled(Phase::Read) {
            self.once(request, is_response, |sup, _, event: &RequestEvent| {
                if let RequestEvent::Response(response) = event {
                    sup.arm_until(response, Phase::Read, is_end);
                }
            });
        }
    }

    fn on_socket(self: &Rc<Self>, socket: &Rc<dyn SocketSource>) {
        let has_path = socket.unix_path().is_some() || self.context.is_ip_literal();
        let connecting = socket.is_connecting();

        if connecting {
            if self.delays.is_enabled(Phase::Lookup) && !has_path && socket.remote_addr().is_none() {
                self.arm_until(socket, Phase::Lookup, is_lookup);
            }

            if self.delays.is_enabled(Phase::Connect) {
                if has_path {
                    self.arm_until(socket, Phase::Connect, is_connect);
                } else {
                    self.once(socket, is_lookup, |sup, socket, event: &SocketEvent| {
                        if matches!(event, SocketEvent::Lookup(Ok(_))) {
                            sup.arm_until(socket, Phase::Connect, is_connect);
                        }
                    });
                }
            }

            if self.delays.is_enabled(Phase::SecureConnect) && self.context.is_secure() {
                self.once(socket, is_connect, |sup, socket, _| {
                    sup.arm_until(socket, Phase::SecureConnect, is_secure_connect);
                });
            }
        }

        if self.delays.is_enabled(Phase::Send) {
            if connecting {
                self.once(socket, is_connect, |sup, _, _| sup.arm_send());
            } else {
                self.arm_send();
            }
        }

        if self.idle_fallback.get() {
            if let Some(request) = self.request() {
                self.arm_until(&request, Phase::Socket, is_response);
            }
        }
    }

    fn arm_send(self: &Rc<Self>) {
        if let Some(request) = self.request() {
            self.arm_until(&request, Phase::Send, is_upload_complete);
        }
    }

    /// The supervised request; detaches once it has been dropped.
    fn request(&self) -> Option<Rc<R>> {
        let request = self.request.upgrade();
        if request.is_none() {
            self.cancel_all();
        }
        request
    }

    /// Arm `phase` and disarm it on the first event of `source` that matches.
    fn arm_until<S, E>(self: &Rc<Self>, source: &Rc<S>, phase: Phase, ends: fn(&E) -> bool)
    where
        S: EventSource<E> + ?Sized + 'static,
        E: 'static,
    {
        if let Some(key) = self.arm(phase) {
            self.once(source, ends, move |sup, _, _| sup.disarm(key));
        }
    }

    fn bind_idle_timeout(self: &Rc<Self>, request: &Rc<R>, threshold_ms: u64) {
        let Some(key) = self.next_key() else {
            return;
        };
        let sup = Rc::downgrade(self);
        let listener: Listener<()> = Rc::new(move |_: &()| {
            if let Some(sup) = sup.upgrade() {
                sup.breach(Phase::Socket, threshold_ms);
            }
        });

        match request.set_idle_timeout(Duration::from_millis(threshold_ms), listener) {
            Some(release) => {
                self.register(key, release);
                self.state.borrow_mut().armed.push(Phase::Socket);
                metrics::record_armed(Phase::Socket);
                tracing::debug!(
                    request_id = %self.request_id,
                    threshold_ms,
                    "Socket idle timeout bound"
                );
            }
            None => self.idle_fallback.set(true),
        }
    }

    /// Arm a timer for `phase` if it is configured and not yet detached.
    fn arm(self: &Rc<Self>, phase: Phase) -> Option<u64> {
        let threshold_ms = self.delays.get(phase)?;
        let key = self.next_key()?;

        let sup = Rc::downgrade(self);
        let timer = add_timeout(&self.scheduler, phase, threshold_ms, move |phase, threshold_ms| {
            if let Some(sup) = sup.upgrade() {
                sup.on_timer_fired(key, phase, threshold_ms);
            }
        });

        {
            let mut state = self.state.borrow_mut();
            state.timers.insert(key, timer);
            state.armed.push(phase);
        }
        metrics::record_armed(phase);
        tracing::debug!(
            request_id = %self.request_id,
            phase = %phase,
            threshold_ms,
            "Phase timer armed"
        );
        Some(key)
    }

    fn disarm(&self, key: u64) {
        let timer = self.state.borrow_mut().timers.remove(&key);
        if let Some(timer) = timer {
            if timer.cancel() {
                tracing::debug!(
                    request_id = %self.request_id,
                    phase = %timer.label(),
                    "Phase timer disarmed"
                );
            }
        }
    }

    fn on_timer_fired(&self, key: u64, phase: Phase, threshold_ms: u64) {
        let timer = self.state.borrow_mut().timers.remove(&key);
        drop(timer);
        self.breach(phase, threshold_ms);
    }

    fn breach(&self, phase: Phase, threshold_ms: u64) {
        {
            let mut state = self.state.borrow_mut();
            if state.detached || state.breached.is_some() {
                return;
            }
        }
        let Some(request) = self.request() else {
            return;
        };
        self.state.borrow_mut().breached = Some(phase);

        tracing::warn!(
            request_id = %self.request_id,
            phase = %phase,
            threshold_ms,
            "Phase timeout exceeded"
        );
        metrics::record_breach(phase);

        request.fail(RequestError::Timeout(TimeoutError::new(phase, threshold_ms)));
        request.abort();
    }

    fn on_error(&self, error: &RequestError) {
        let response_received = self.state.borrow().response_received;
        if error.is_teardown() && response_received {
            tracing::debug!(
                request_id = %self.request_id,
                error = %error,
                "Ignoring connection teardown after response"
            );
            return;
        }
        self.cancel_all();
    }

    fn on_response_end(&self) {
        tracing::debug!(request_id = %self.request_id, "Response ended");
        self.cancel_all();
    }

    fn next_key(&self) -> Option<u64> {
        let mut state = self.state.borrow_mut();
        if state.detached {
            return None;
        }
        state.next_key += 1;
        Some(state.next_key)
    }

    fn register(&self, key: u64, release: Release) {
        let leftover = {
            let mut state = self.state.borrow_mut();
            if state.detached {
                Some(release)
            } else {
                state.subscriptions.insert(key, release);
                None
            }
        };
        if let Some(release) = leftover {
            release();
        }
    }

    fn release(&self, key: u64) {
        let release = self.state.borrow_mut().subscriptions.remove(&key);
        if let Some(release) = release {
            release();
        }
    }

    /// Subscribe until detached. The listener keeps the supervision alive
    /// for as long as `source` holds it.
    fn on<S, E, F>(self: &Rc<Self>, source: &Rc<S>, handler: F)
    where
        S: EventSource<E> + ?Sized + 'static,
        E: 'static,
        F: Fn(&Rc<Self>, &E) + 'static,
    {
        let Some(key) = self.next_key() else {
            return;
        };
        let sup = Rc::clone(self);
        let listener: Listener<E> = Rc::new(move |event: &E| {
            if !sup.is_detached() {
                handler(&sup, event);
            }
        });
        let id = source.subscribe(listener);
        let source = Rc::downgrade(source);
        self.register(
            key,
            Box::new(move || {
                if let Some(source) = source.upgrade() {
                    source.unsubscribe(id);
                }
            }),
        );
    }

    /// Subscribe for the first event matching `matches`, then unsubscribe.
    fn once<S, E, F>(self: &Rc<Self>, source: &Rc<S>, matches: fn(&E) -> bool, handler: F)
    where
        S: EventSource<E> + ?Sized + 'static,
        E: 'static,
        F: FnOnce(&Rc<Self>, &Rc<S>, &E) + 'static,
    {
        let Some(key) = self.next_key() else {
            return;
        };
        let sup: Weak<Self> = Rc::downgrade(self);
        let weak_source: Weak<S> = Rc::downgrade(source);
        let handler = RefCell::new(Some(handler));
        let listener: Listener<E> = Rc::new(move |event: &E| {
            if !matches(event) {
                return;
            }
            let Some(sup) = sup.upgrade() else {
                return;
            };
            let Some(handler) = handler.borrow_mut().take() else {
                return;
            };
            sup.release(key);
            if sup.is_detached() {
                return;
            }
            if let Some(source) = weak_source.upgrade() {
                handler(&sup, &source, event);
            }
        });

        let id = source.subscribe(listener);
        let source = Rc::downgrade(source);
        self.register(
            key,
            Box::new(move || {
                if let Some(source) = source.upgrade() {
                    source.unsubscribe(id);
                }
            }),
        );
    }
}

impl<R: RequestSource> Drop for Supervision<R> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl<R: RequestSource> Detach for Supervision<R> {
    fn cancel_all(&self) {
        let (timers, subscriptions) = {
            let mut state = self.state.borrow_mut();
            if state.detached {
                return;
            }
            state.detached = true;
            (
                std::mem::take(&mut state.timers),
                std::mem::take(&mut state.subscriptions),
            )
        };

        let canceled = timers.values().filter(|timer| timer.cancel()).count();
        let released = subscriptions.len();
        for release in subscriptions.into_values() {
            release();
        }

        metrics::record_detached();
        tracing::debug!(
            request_id = %self.request_id,
            canceled,
            released,
            "Supervisor detached"
        );
    }

    fn is_detached(&self) -> bool {
        self.state.borrow().detached
    }

    fn pending_phases(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = self
            .state
            .borrow()
            .timers
            .values()
            .filter(|timer| timer.is_pending())
            .map(PhaseTimer::label)
            .collect();
        phases.sort();
        phases
    }

    fn armed_history(&self) -> Vec<Phase> {
        self.state.borrow().armed.clone()
    }

    fn live_subscriptions(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }
}
