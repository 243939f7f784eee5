//! Connection context: decides which connection phases apply.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Target of the connection, as the caller addressed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionContext {
    pub host: Option<String>,
    pub hostname: Option<String>,
    /// URL scheme, with or without the trailing colon (`https`, `https:`).
    pub protocol: String,
}

impl ConnectionContext {
    pub fn new(hostname: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            host: None,
            hostname: Some(hostname.into()),
            protocol: protocol.into(),
        }
    }

    /// Build the context from a request URL.
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().map(str::to_string);
        Self {
            host: host.clone(),
            hostname: host,
            protocol: url.scheme().to_string(),
        }
    }

    /// The name the connection targets: `hostname`, falling back to `host`.
    pub fn target(&self) -> Option<&str> {
        self.hostname.as_deref().or(self.host.as_deref())
    }

    /// Whether the target is a literal IP address, which needs no lookup.
    pub fn is_ip_literal(&self) -> bool {
        self.target()
            .map(|target| target.trim_start_matches('[').trim_end_matches(']'))
            .is_some_and(|target| target.parse::<IpAddr>().is_ok())
    }

    /// Whether the protocol negotiates TLS after connecting.
    pub fn is_secure(&self) -> bool {
        let scheme = self.protocol.trim_end_matches(':').to_ascii_lowercase();
        scheme == "https" || scheme == "wss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ip_literals() {
        assert!(ConnectionContext::new("127.0.0.1", "http").is_ip_literal());
        assert!(ConnectionContext::new("[::1]", "http").is_ip_literal());
        assert!(!ConnectionContext::new("example.com", "http").is_ip_literal());
        assert!(!ConnectionContext::default().is_ip_literal());
    }

    #[test]
    fn hostname_takes_precedence_over_host() {
        let ctx = ConnectionContext {
            host: Some("10.0.0.1".into()),
            hostname: Some("example.com".into()),
            protocol: "http:".into(),
        };
        assert_eq!(ctx.target(), Some("example.com"));
        assert!(!ctx.is_ip_literal());
    }

    #[test]
    fn secure_protocols() {
        assert!(ConnectionContext::new("a", "https:").is_secure());
        assert!(ConnectionContext::new("a", "HTTPS").is_secure());
        assert!(!ConnectionContext::new("a", "http:").is_secure());
    }

    #[test]
    fn from_url_keeps_scheme_and_host() {
        let url = Url::parse("https://[::1]:8443/path").unwrap();
        let ctx = ConnectionContext::from_url(&url);
        assert!(ctx.is_secure());
        assert!(ctx.is_ip_literal());

        let url = Url::parse("http://example.com/").unwrap();
        let ctx = ConnectionContext::from_url(&url);
        assert_eq!(ctx.target(), Some("example.com"));
        assert!(!ctx.is_secure());
    }
}
