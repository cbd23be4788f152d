use ipnet::IpNet;
use std::net::SocketAddr;

/// Placeholder some proxies write when they do not know the origin.
const UNKNOWN: &str = "unknown";

/// Forwarding headers consulted for the origin address, highest priority first.
pub const FORWARDING_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "proxy-client-ip",
    "wl-proxy-client-ip",
    "http_client_ip",
    "http_x_forwarded_for",
];

/// What the host layer knows about the caller.
#[derive(Debug, Clone, Copy)]
pub struct RequestHints<'a> {
    /// Explicit identity configured for the route, used verbatim when non-empty.
    pub identity_hint: Option<&'a str>,
    /// Request headers as (name, value) pairs.
    pub headers: &'a [(String, String)],
    /// Transport-level peer address.
    pub peer_addr: Option<SocketAddr>,
}

/// Derives a stable client identifier from a request.
///
/// The result is not authentication: it is only a consistent string for the
/// signature codec to bind into a tamper-evident token.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentityResolver {
    trusted_proxies: Vec<IpNet>,
}

impl ClientIdentityResolver {
    /// Forwarding headers are honoured only from peers inside
    /// `trusted_proxies`. An empty list honours them from every peer.
    pub fn new(trusted_proxies: Vec<IpNet>) -> Self {
        Self { trusted_proxies }
    }

    pub fn resolve(&self, hints: &RequestHints<'_>) -> String {
        if let Some(hint) = hints.identity_hint.filter(|h| !h.is_empty()) {
            return hint.to_string();
        }

        if self.trusts(hints.peer_addr) {
            if let Some(origin) = forwarded_origin(hints.headers) {
                return origin.to_string();
            }
        }

        hints
            .peer_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn trusts(&self, peer: Option<SocketAddr>) -> bool {
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.is_some_and(|addr| self.trusted_proxies.iter().any(|net| net.contains(&addr.ip())))
    }
}

/// First usable hop from the forwarding headers, in priority order.
fn forwarded_origin(headers: &[(String, String)]) -> Option<&str> {
    FORWARDING_HEADERS.iter().find_map(|name| {
        headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| v.split(',').next().map(str::trim))
            .find(|hop| !hop.is_empty() && !hop.eq_ignore_ascii_case(UNKNOWN))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn peer() -> Option<SocketAddr> {
        Some("203.0.113.9:51234".parse().unwrap())
    }

    #[test]
    fn identity_hint_wins() {
        let h = headers(&[("X-Forwarded-For", "198.51.100.1")]);
        let hints = RequestHints {
            identity_hint: Some("new_user"),
            headers: &h,
            peer_addr: peer(),
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "new_user");
    }

    #[test]
    fn empty_hint_is_ignored() {
        let hints = RequestHints {
            identity_hint: Some(""),
            headers: &[],
            peer_addr: peer(),
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "203.0.113.9");
    }

    #[test]
    fn takes_first_hop_of_forwarded_for() {
        let h = headers(&[("x-forwarded-for", " 198.51.100.1 , 10.0.0.1")]);
        let hints = RequestHints {
            identity_hint: None,
            headers: &h,
            peer_addr: peer(),
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "198.51.100.1");
    }

    #[test]
    fn skips_unknown_placeholder_and_follows_priority() {
        let h = headers(&[
            ("WL-Proxy-Client-IP", "192.0.2.7"),
            ("X-Forwarded-For", "UNKNOWN"),
            ("Proxy-Client-IP", ""),
            ("HTTP_CLIENT_IP", "192.0.2.8"),
        ]);
        let hints = RequestHints {
            identity_hint: None,
            headers: &h,
            peer_addr: peer(),
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "192.0.2.7");
    }

    #[test]
    fn falls_back_to_peer_without_port() {
        let h = headers(&[("x-forwarded-for", "unknown")]);
        let hints = RequestHints {
            identity_hint: None,
            headers: &h,
            peer_addr: Some("[2001:db8::1]:443".parse().unwrap()),
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "2001:db8::1");
    }

    #[test]
    fn no_peer_and_no_headers_is_unknown() {
        let hints = RequestHints {
            identity_hint: None,
            headers: &[],
            peer_addr: None,
        };
        assert_eq!(ClientIdentityResolver::default().resolve(&hints), "unknown");
    }

    #[test]
    fn untrusted_peer_cannot_spoof_forwarding_headers() {
        let resolver = ClientIdentityResolver::new(vec!["10.0.0.0/8".parse().unwrap()]);
        let h = headers(&[("x-forwarded-for", "198.51.100.1")]);

        let untrusted = RequestHints {
            identity_hint: None,
            headers: &h,
            peer_addr: peer(),
        };
        assert_eq!(resolver.resolve(&untrusted), "203.0.113.9");

        let trusted = RequestHints {
            identity_hint: None,
            headers: &h,
            peer_addr: Some("10.1.2.3:8080".parse().unwrap()),
        };
        assert_eq!(resolver.resolve(&trusted), "198.51.100.1");
    }
}
