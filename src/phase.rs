//! Request phases and per-phase time budgets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A distinguishable stage of a request's lifecycle with its own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// DNS resolution of the target hostname.
    Lookup,
    /// Transport connection establishment.
    Connect,
    /// TLS handshake after the transport connects.
    SecureConnect,
    /// Idle time on the socket.
    Socket,
    /// Uploading the request body.
    Send,
    /// Waiting for the response head once the upload completed.
    Response,
    /// Receiving the full response body.
    Read,
    /// The whole request, from attach until the response ends.
    Request,
}

impl Phase {
    /// Every phase, in lifecycle order.
    pub const ALL: [Phase; 8] = [
        Phase::Lookup,
        Phase::Connect,
        Phase::SecureConnect,
        Phase::Socket,
        Phase::Send,
        Phase::Response,
        Phase::Read,
        Phase::Request,
    ];

    /// The phase name as used in configuration and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lookup => "lookup",
            Phase::Connect => "connect",
            Phase::SecureConnect => "secureConnect",
            Phase::Socket => "socket",
            Phase::Send => "send",
            Phase::Response => "response",
            Phase::Read => "read",
            Phase::Request => "request",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Optional millisecond threshold per phase. Absent means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DelayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_connect: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<u64>,
}

impl DelayConfig {
    /// A config with every phase disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the threshold for `phase`.
    pub fn with(mut self, phase: Phase, threshold_ms: u64) -> Self {
        *self.slot_mut(phase) = Some(threshold_ms);
        self
    }

    /// Threshold for `phase`, if enabled.
    pub fn get(&self, phase: Phase) -> Option<u64> {
        match phase {
            Phase::Lookup => self.lookup,
            Phase::Connect => self.connect,
            Phase::SecureConnect => self.secure_connect,
            Phase::Socket => self.socket,
            Phase::Send => self.send,
            Phase::Response => self.response,
            Phase::Read => self.read,
            Phase::Request => self.request,
        }
    }

    pub fn is_enabled(&self, phase: Phase) -> bool {
        self.get(phase).is_some()
    }

    /// True when no phase has a threshold.
    pub fn is_empty(&self) -> bool {
        Phase::ALL.iter().all(|phase| !self.is_enabled(*phase))
    }

    /// Enabled phases with their thresholds, in lifecycle order.
    pub fn enabled(&self) -> impl Iterator<Item = (Phase, u64)> + '_ {
        Phase::ALL
            .into_iter()
            .filter_map(|phase| self.get(phase).map(|ms| (phase, ms)))
    }

    fn slot_mut(&mut self, phase: Phase) -> &mut Option<u64> {
        match phase {
            Phase::Lookup => &mut self.lookup,
            Phase::Connect => &mut self.connect,
            Phase::SecureConnect => &mut self.secure_connect,
            Phase::Socket => &mut self.socket,
            Phase::Send => &mut self.send,
            Phase::Response => &mut self.response,
            Phase::Read => &mut self.read,
            Phase::Request => &mut self.request,
        }
    }
}
