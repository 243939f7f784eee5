//! Scripted request lifecycles on a virtual clock.

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::phase::{DelayConfig, Phase};
use crate::sim::fake::{FakeRequest, FakeResponse, FakeSocket};
use crate::source::ConnectionContext;
use crate::supervisor::TimeoutSupervisor;
use crate::timing::{ManualScheduler, Scheduler};

/// Address used for every simulated peer (TEST-NET-1).
const SIM_PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

/// When each lifecycle signal happens, in milliseconds after attach.
/// `None` means the signal never happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Scenario {
    pub context: ConnectionContext,
    /// The socket is a pooled connection that is already established.
    pub reused: bool,
    /// Connect through a unix domain socket.
    pub unix_socket: bool,
    /// Transport has no native idle timeout.
    pub no_idle_primitive: bool,
    pub lookup_ms: Option<u64>,
    /// Resolution ends with an error instead of an address.
    pub lookup_fails: bool,
    pub connect_ms: Option<u64>,
    pub secure_connect_ms: Option<u64>,
    pub upload_ms: Option<u64>,
    pub response_ms: Option<u64>,
    pub end_ms: Option<u64>,
    /// How long to run; defaults to just past the last signal or threshold.
    pub horizon_ms: Option<u64>,
}

/// The breach a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreachReport {
    pub phase: Phase,
    pub threshold_ms: u64,
    pub code: &'static str,
    /// Virtual time at which the error surfaced.
    pub at_ms: u64,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub breach: Option<BreachReport>,
    /// The response ended before any breach.
    pub completed: bool,
    pub aborted: bool,
    pub timeout_errors: usize,
    /// Every phase armed, in arming order.
    pub armed: Vec<Phase>,
    /// Left over after the final `cancel_all`; always zero when healthy.
    pub pending_timers: usize,
    pub live_subscriptions: usize,
    pub idle_listeners: usize,
    pub elapsed_ms: u64,
}

impl Scenario {
    fn steps(&self) -> impl Iterator<Item = u64> {
        [
            self.lookup_ms,
            self.connect_ms,
            self.secure_connect_ms,
            self.upload_ms,
            self.response_ms,
            self.end_ms,
        ]
        .into_iter()
        .flatten()
    }

    /// The run length used when `horizon_ms` is not set.
    pub fn horizon(&self, delays: &DelayConfig) -> u64 {
        if let Some(horizon) = self.horizon_ms {
            return horizon;
        }
        let last_signal = self.steps().max().unwrap_or(0);
        let largest_threshold = delays.enabled().map(|(_, ms)| ms).max().unwrap_or(0);
        last_signal.max(largest_threshold).saturating_add(1)
    }

    /// Attach a supervisor with `delays` and play the script.
    pub fn run(&self, delays: &DelayConfig) -> Outcome {
        let clock = Rc::new(ManualScheduler::new());
        let scheduler: Rc<dyn Scheduler> = clock.clone();

        let mut socket = if self.reused {
            FakeSocket::established(SocketAddr::new(SIM_PEER, 443))
        } else {
            FakeSocket::connecting()
        };
        if self.unix_socket {
            socket = socket.with_unix_path("/run/phase-timeout.sock");
        }
        if !self.no_idle_primitive {
            socket = socket.with_idle_timeout(Rc::clone(&scheduler));
        }
        let socket = Rc::new(socket);
        let request = Rc::new(FakeRequest::new(&socket));

        let supervisor = TimeoutSupervisor::new(Rc::clone(&scheduler));
        let handle = supervisor.attach(&request, delays, &self.context);
        request.assign_socket();

        let skips_lookup = self.unix_socket || self.context.is_ip_literal();
        if !self.reused {
            if !skips_lookup {
                let host = self.context.target().unwrap_or_default().to_string();
                let fails = self.lookup_fails;
                self.at(&scheduler, &request, self.lookup_ms, move |request| {
                    if fails {
                        request.socket().fail_lookup(&host, "name not known");
                    } else {
                        request.socket().resolve(SIM_PEER);
                    }
                });
            }
            self.at(&scheduler, &request, self.connect_ms, |request| {
                request.socket().connect(443);
            });
            if self.context.is_secure() {
                self.at(&scheduler, &request, self.secure_connect_ms, |request| {
                    request.socket().secure_connect();
                });
            }
        }

        self.at(&scheduler, &request, self.upload_ms, |request| {
            request.complete_upload();
        });

        let response: Rc<RefCell<Option<Rc<FakeResponse>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&response);
        self.at(&scheduler, &request, self.response_ms, move |request| {
            *slot.borrow_mut() = Some(request.respond());
        });
        let completed = Rc::new(RefCell::new(false));
        let done = Rc::clone(&completed);
        let slot = Rc::clone(&response);
        self.at(&scheduler, &request, self.end_ms, move |_| {
            let response = slot.borrow().clone();
            if let Some(response) = response {
                response.end();
                *done.borrow_mut() = true;
            }
        });

        let horizon = Duration::from_millis(self.horizon(delays));
        let mut breach = None;
        loop {
            let done = match clock.next_deadline() {
                Some(deadline) if deadline <= horizon => {
                    clock.advance_to(deadline);
                    false
                }
                _ => {
                    clock.advance_to(horizon);
                    true
                }
            };
            if breach.is_none() {
                if let Some(timeout) = request.timeouts().first() {
                    breach = Some(BreachReport {
                        phase: timeout.phase(),
                        threshold_ms: timeout.threshold_ms(),
                        code: timeout.code(),
                        at_ms: clock.now().as_millis() as u64,
                    });
                }
            }
            if done {
                break;
            }
        }

        let armed = handle.armed_history();
        handle.cancel_all();
        let completed = *completed.borrow();

        Outcome {
            completed: completed && breach.is_none(),
            breach,
            aborted: request.is_aborted(),
            timeout_errors: request.timeouts().len(),
            armed,
            pending_timers: handle.pending_phases().len(),
            live_subscriptions: handle.live_subscriptions(),
            idle_listeners: socket.idle_listener_count(),
            elapsed_ms: clock.now().as_millis() as u64,
        }
    }

    /// Schedule `step` at `offset`, skipped once the request was aborted.
    fn at<F>(&self, scheduler: &Rc<dyn Scheduler>, request: &Rc<FakeRequest>, offset: Option<u64>, step: F)
    where
        F: FnOnce(&FakeRequest) + 'static,
    {
        let Some(offset) = offset else {
            return;
        };
        let request = Rc::clone(request);
        scheduler.schedule(
            Duration::from_millis(offset),
            Box::new(move || {
                if !request.is_aborted() {
                    step(&request);
                }
            }),
        );
    }
}
