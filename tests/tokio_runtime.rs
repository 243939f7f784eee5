//! Supervision on the Tokio scheduler, in real time.

use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;

use phase_timeout::sim::{FakeRequest, FakeSocket};
use phase_timeout::{Phase, Scheduler, TimeoutSupervisor, TokioScheduler};

mod common;
use common::{breaches, delays, http};

struct Runtime {
    tokio: TokioScheduler,
    supervisor: TimeoutSupervisor,
}

impl Runtime {
    fn new() -> Self {
        let tokio = TokioScheduler::new();
        let scheduler: Rc<dyn Scheduler> = Rc::new(tokio.clone());
        Self {
            supervisor: TimeoutSupervisor::new(scheduler),
            tokio,
        }
    }

    fn socket(&self) -> Rc<FakeSocket> {
        Rc::new(FakeSocket::connecting().with_idle_timeout(Rc::new(self.tokio.clone())))
    }
}

#[tokio::test]
async fn request_timeout_fires_in_real_time() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let socket = rt.socket();
            let request = Rc::new(FakeRequest::new(&socket));
            let handle = rt
                .supervisor
                .attach(&request, &delays(&[(Phase::Request, 20)]), &http("example.com"));
            request.assign_socket();

            tokio::time::sleep(Duration::from_millis(100)).await;

            assert_eq!(breaches(&request), vec![(Phase::Request, 20)]);
            assert!(request.is_aborted());
            assert!(handle.is_detached());
            assert_eq!(rt.tokio.pending(), 0);
        })
        .await;
}

#[tokio::test]
async fn completed_request_leaves_no_tasks() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let socket = rt.socket();
            let request = Rc::new(FakeRequest::new(&socket));
            let handle = rt.supervisor.attach(
                &request,
                &delays(&[(Phase::Response, 500), (Phase::Request, 1_000)]),
                &http("example.com"),
            );

            request.assign_socket();
            tokio::time::sleep(Duration::from_millis(5)).await;
            request.complete_upload();
            request.respond().end();

            assert!(handle.is_detached());
            assert_eq!(rt.tokio.pending(), 0);

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(request.errors().is_empty());
        })
        .await;
}

#[tokio::test]
async fn idle_socket_times_out_and_releases_listener() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let socket = rt.socket();
            let request = Rc::new(FakeRequest::new(&socket));
            rt.supervisor
                .attach(&request, &delays(&[(Phase::Socket, 10)]), &http("example.com"));
            request.assign_socket();

            tokio::time::sleep(Duration::from_millis(100)).await;

            assert_eq!(breaches(&request), vec![(Phase::Socket, 10)]);
            assert_eq!(socket.idle_listener_count(), 0);
        })
        .await;
}
