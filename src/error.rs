//! Error values crossing the request's error channel.

use std::fmt;

use thiserror::Error;

use crate::phase::Phase;

/// Code carried by every phase timeout.
pub const TIMEOUT_CODE: &str = "ETIMEDOUT";

/// A phase budget was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Timeout awaiting '{phase}' for {threshold_ms}ms")]
pub struct TimeoutError {
    phase: Phase,
    threshold_ms: u64,
}

impl TimeoutError {
    pub(crate) fn new(phase: Phase, threshold_ms: u64) -> Self {
        Self {
            phase,
            threshold_ms,
        }
    }

    /// The phase whose budget was exceeded.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The budget that was exceeded, in milliseconds.
    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    pub fn code(&self) -> &'static str {
        TIMEOUT_CODE
    }
}

/// Structured classification of transport failures reported by the
/// collaborator that owns the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Peer reset the connection.
    ConnectionReset,
    /// Peer closed the connection without answering.
    SocketHangUp,
    /// Peer half-closed its side of the connection.
    HalfClosed,
    /// Connection was refused.
    ConnectionRefused,
    /// Name resolution failed.
    Lookup,
    /// TLS negotiation failed.
    Tls,
    /// The request was aborted by its owner.
    Aborted,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Kinds that describe the connection being torn down by the peer.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::ConnectionReset
                | TransportErrorKind::SocketHangUp
                | TransportErrorKind::HalfClosed
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::SocketHangUp => "socket hang up",
            TransportErrorKind::HalfClosed => "half closed",
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::Lookup => "lookup failed",
            TransportErrorKind::Tls => "tls failure",
            TransportErrorKind::Aborted => "aborted",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// Errors observed on a request's error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Raised by the supervisor on breach.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Raised by the transport collaborator.
    #[error("{kind}: {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl RequestError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        RequestError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// The timeout carried by this error, if it is one.
    pub fn as_timeout(&self) -> Option<&TimeoutError> {
        match self {
            RequestError::Timeout(timeout) => Some(timeout),
            RequestError::Transport { .. } => None,
        }
    }

    /// Whether this is a peer teardown of the connection, which is expected
    /// once the response has already arrived.
    pub fn is_teardown(&self) -> bool {
        match self {
            RequestError::Timeout(_) => false,
            RequestError::Transport { kind, .. } => kind.is_teardown(),
        }
    }
}

/// DNS resolution failure reported on a socket's `lookup` signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lookup of '{host}' failed: {message}")]
pub struct LookupError {
    pub host: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_display_and_code() {
        let err = TimeoutError::new(Phase::SecureConnect, 0);
        assert_eq!(err.to_string(), "Timeout awaiting 'secureConnect' for 0ms");
        assert_eq!(err.code(), "ETIMEDOUT");
        assert_eq!(err.phase(), Phase::SecureConnect);
        assert_eq!(err.threshold_ms(), 0);
    }

    #[test]
    fn request_error_wraps_timeout_transparently() {
        let err = RequestError::from(TimeoutError::new(Phase::Request, 1));
        assert_eq!(err.to_string(), "Timeout awaiting 'request' for 1ms");
        assert_eq!(err.as_timeout().map(|t| t.phase()), Some(Phase::Request));
        assert!(!err.is_teardown());
    }

    #[test]
    fn teardown_is_classified_by_kind_not_message() {
        let reset = RequestError::transport(TransportErrorKind::ConnectionReset, "whatever");
        assert!(reset.is_teardown());

        let refused = RequestError::transport(TransportErrorKind::ConnectionRefused, "socket hang up");
        assert!(!refused.is_teardown());
        assert_eq!(refused.to_string(), "connection refused: socket hang up");
    }
}
