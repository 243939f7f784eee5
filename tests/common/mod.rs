//! Shared utilities for lifecycle tests.
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use phase_timeout::sim::{FakeRequest, FakeSocket};
use phase_timeout::{
    CancelHandle, ConnectionContext, DelayConfig, ManualScheduler, Phase, Scheduler,
    TimeoutSupervisor,
};

pub const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

/// A supervisor on a virtual clock.
pub struct Harness {
    pub clock: Rc<ManualScheduler>,
    pub supervisor: TimeoutSupervisor,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Rc::new(ManualScheduler::new());
        let scheduler: Rc<dyn Scheduler> = clock.clone();
        Self {
            supervisor: TimeoutSupervisor::new(scheduler),
            clock,
        }
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.clock.clone()
    }

    /// A socket that still has to resolve and connect.
    pub fn fresh_socket(&self) -> Rc<FakeSocket> {
        Rc::new(FakeSocket::connecting().with_idle_timeout(self.scheduler()))
    }

    /// A keep-alive socket already connected to the peer.
    pub fn pooled_socket(&self) -> Rc<FakeSocket> {
        Rc::new(
            FakeSocket::established(SocketAddr::new(PEER, 443)).with_idle_timeout(self.scheduler()),
        )
    }

    pub fn attach(
        &self,
        request: &Rc<FakeRequest>,
        delays: DelayConfig,
        context: &ConnectionContext,
    ) -> CancelHandle {
        self.supervisor.attach(request, &delays, context)
    }

    pub fn advance(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    /// Run `step` `ms` from now unless the request was aborted first.
    pub fn after<F>(&self, ms: u64, request: &Rc<FakeRequest>, step: F)
    where
        F: FnOnce(&FakeRequest) + 'static,
    {
        let request = Rc::clone(request);
        self.clock.schedule(
            Duration::from_millis(ms),
            Box::new(move || {
                if !request.is_aborted() {
                    step(&request);
                }
            }),
        );
    }
}

pub fn request_on(socket: &Rc<FakeSocket>) -> Rc<FakeRequest> {
    Rc::new(FakeRequest::new(socket))
}

pub fn http(host: &str) -> ConnectionContext {
    ConnectionContext::new(host, "http")
}

pub fn https(host: &str) -> ConnectionContext {
    ConnectionContext::new(host, "https")
}

pub fn delays(phases: &[(Phase, u64)]) -> DelayConfig {
    phases
        .iter()
        .fold(DelayConfig::new(), |delays, (phase, ms)| delays.with(*phase, *ms))
}

/// `(phase, threshold_ms)` of every timeout the request received.
pub fn breaches(request: &FakeRequest) -> Vec<(Phase, u64)> {
    request
        .timeouts()
        .iter()
        .map(|timeout| (timeout.phase(), timeout.threshold_ms()))
        .collect()
}
