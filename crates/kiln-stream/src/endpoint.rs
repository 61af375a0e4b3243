//! Endpoint validation and host policy.
//!
//! Validation runs once, at client construction, and is a security
//! boundary: a rejected endpoint never reaches the transport. Only
//! WebSocket schemes are accepted (a `javascript:` or `file:` URI fails on
//! the scheme check), credentials in the URL are refused, and the host must
//! be loopback or explicitly allowed by the [`HostPolicy`].

use url::{Host, Url};

use kiln_core::errors::EndpointError;

/// Allow-set of hosts the client may connect to.
///
/// Loopback targets (`localhost`, `127.0.0.0/8`, `::1`) are always
/// permitted; anything else must be listed explicitly. Matching is
/// case-insensitive and subdomain-aware: allowing `example.com` also
/// allows `render.example.com`.
#[derive(Clone, Debug, Default)]
pub struct HostPolicy {
    allowed_hosts: Vec<String>,
}

impl HostPolicy {
    /// Policy permitting only loopback targets.
    #[must_use]
    pub fn loopback_only() -> Self {
        Self::default()
    }

    /// Extend the allow-set with a host.
    #[must_use]
    pub fn allow(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.push(host.into().to_lowercase());
        self
    }

    fn permits(&self, host: &Host<&str>) -> bool {
        match host {
            Host::Ipv4(ip) => ip.is_loopback() || self.listed(&ip.to_string()),
            Host::Ipv6(ip) => ip.is_loopback() || self.listed(&ip.to_string()),
            Host::Domain(name) => {
                let name = name.to_lowercase();
                name == "localhost" || self.listed(&name)
            }
        }
    }

    fn listed(&self, host: &str) -> bool {
        self.allowed_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }
}

/// A validated, immutable connection target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse and validate a raw endpoint string against a host policy.
    ///
    /// Checks, in order: URL syntax, `ws`/`wss` scheme, absence of
    /// credentials, host presence, host policy. No network I/O happens
    /// here or as a consequence of a failure.
    pub fn parse(raw: &str, policy: &HostPolicy) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::InvalidFormat("endpoint is empty".into()));
        }

        let url = Url::parse(trimmed).map_err(|e| EndpointError::InvalidFormat(e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(EndpointError::UnsupportedScheme(other.into())),
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EndpointError::CredentialsInUrl);
        }

        let host = url
            .host()
            .ok_or_else(|| EndpointError::InvalidFormat("endpoint has no host".into()))?;

        if !policy.permits(&host) {
            return Err(EndpointError::HostNotAllowed(host.to_string()));
        }

        Ok(Self { url })
    }

    /// The URL scheme (`ws` or `wss`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The validated host.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// The port, explicit or scheme-default (80 for `ws`, 443 for `wss`).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// The URL path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// The full URL string handed to the transport.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn loopback() -> HostPolicy {
        HostPolicy::loopback_only()
    }

    #[test]
    fn accepts_ws_localhost() {
        let ep = Endpoint::parse("ws://localhost:8188/ws", &loopback()).unwrap();
        assert_eq!(ep.scheme(), "ws");
        assert_eq!(ep.host(), "localhost");
        assert_eq!(ep.port(), 8188);
        assert_eq!(ep.path(), "/ws");
    }

    #[test]
    fn accepts_wss_loopback_ip() {
        let ep = Endpoint::parse("wss://127.0.0.1/ws", &loopback()).unwrap();
        assert_eq!(ep.scheme(), "wss");
        assert_eq!(ep.port(), 443);
    }

    #[test]
    fn accepts_whole_loopback_block() {
        assert!(Endpoint::parse("ws://127.0.0.53:8188", &loopback()).is_ok());
    }

    #[test]
    fn accepts_ipv6_loopback() {
        assert!(Endpoint::parse("ws://[::1]:8188", &loopback()).is_ok());
    }

    #[test]
    fn rejects_script_scheme() {
        let err = Endpoint::parse("javascript:alert(1)", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::UnsupportedScheme(s) => assert_eq!(s, "javascript"));
    }

    #[test]
    fn rejects_file_scheme() {
        let err = Endpoint::parse("file:///etc/passwd", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::UnsupportedScheme(s) => assert_eq!(s, "file"));
    }

    #[test]
    fn rejects_http_scheme() {
        let err = Endpoint::parse("http://localhost:8188", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::UnsupportedScheme(_));
    }

    #[test]
    fn rejects_remote_host_by_default() {
        let err = Endpoint::parse("ws://evil.com:8188", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::HostNotAllowed(h) => assert_eq!(h, "evil.com"));
    }

    #[test]
    fn rejects_private_network_host_by_default() {
        let err = Endpoint::parse("ws://192.168.1.1:8188", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::HostNotAllowed(_));
    }

    #[test]
    fn rejects_credentials() {
        let err = Endpoint::parse("ws://user:secret@localhost:8188", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::CredentialsInUrl);
    }

    #[test]
    fn rejects_garbage() {
        let err = Endpoint::parse("not a url", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::InvalidFormat(_));
    }

    #[test]
    fn rejects_empty() {
        let err = Endpoint::parse("   ", &loopback()).unwrap_err();
        assert_matches!(err, EndpointError::InvalidFormat(_));
    }

    #[test]
    fn allow_set_admits_configured_host() {
        let policy = HostPolicy::loopback_only().allow("render.example.com");
        assert!(Endpoint::parse("ws://render.example.com:8188", &policy).is_ok());
        // Other hosts stay rejected.
        assert!(Endpoint::parse("ws://other.example.net:8188", &policy).is_err());
    }

    #[test]
    fn allow_set_is_subdomain_aware() {
        let policy = HostPolicy::loopback_only().allow("example.com");
        assert!(Endpoint::parse("ws://gpu1.example.com", &policy).is_ok());
        // Suffix tricks do not match.
        assert!(Endpoint::parse("ws://notexample.com", &policy).is_err());
    }

    #[test]
    fn allow_set_is_case_insensitive() {
        let policy = HostPolicy::loopback_only().allow("Example.COM");
        assert!(Endpoint::parse("ws://EXAMPLE.com", &policy).is_ok());
    }

    #[test]
    fn display_round_trips_url() {
        let ep = Endpoint::parse("ws://localhost:8188/ws", &loopback()).unwrap();
        assert_eq!(ep.to_string(), "ws://localhost:8188/ws");
    }
}
