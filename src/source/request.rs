//! Capabilities a request, its socket and its response expose.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{LookupError, RequestError};
use crate::source::events::{EventSource, Listener};

/// Identity of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Signals emitted by a request.
#[derive(Clone)]
pub enum RequestEvent {
    /// A socket was assigned to the request (fresh or pooled).
    Socket(Rc<dyn SocketSource>),
    /// The request body has been fully written.
    UploadComplete,
    /// The response head arrived.
    Response(Rc<dyn ResponseSource>),
    /// The request failed.
    Error(RequestError),
}

impl fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestEvent::Socket(_) => f.write_str("Socket"),
            RequestEvent::UploadComplete => f.write_str("UploadComplete"),
            RequestEvent::Response(_) => f.write_str("Response"),
            RequestEvent::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// Signals emitted by a socket while it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Name resolution finished, successfully or not.
    Lookup(Result<IpAddr, LookupError>),
    /// Transport connected.
    Connect,
    /// TLS handshake finished.
    SecureConnect,
}

/// Signals emitted by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEvent {
    /// The body was fully received.
    End,
}

/// Removes one listener from a connection's native idle timeout.
pub type IdleRelease = Box<dyn FnOnce()>;

/// An outbound request under supervision.
pub trait RequestSource: EventSource<RequestEvent> + 'static {
    /// Stable identity of this logical request.
    fn id(&self) -> RequestId;

    /// Deliver `error` on the request's error channel.
    fn fail(&self, error: RequestError);

    /// Abort the underlying request.
    fn abort(&self);

    /// Install `listener` on the transport's native per-connection idle
    /// timeout. `None` means the transport has no such primitive.
    ///
    /// The returned release removes exactly this listener and keeps working
    /// after the request itself is gone; other consumers of the idle timeout
    /// are left untouched.
    fn set_idle_timeout(&self, _threshold: Duration, _listener: Listener<()>) -> Option<IdleRelease> {
        None
    }
}

/// The transport connection assigned to a request.
pub trait SocketSource: EventSource<SocketEvent> {
    /// Whether the socket is still establishing its connection.
    fn is_connecting(&self) -> bool;

    /// Resolved remote address, once known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Unix domain socket path, when connecting through one.
    fn unix_path(&self) -> Option<PathBuf>;
}

/// The response to a request.
pub trait ResponseSource: EventSource<ResponseEvent> {}
