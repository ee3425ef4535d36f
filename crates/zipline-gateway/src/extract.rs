//! Client-identity and analytics-hint extraction from request headers.

use axum::http::HeaderMap;
use std::net::SocketAddr;
use zipline_service::ClickHints;

/// Extracts the client identity used for per-client admission.
///
/// Preference order: the first comma-separated entry of
/// `X-Forwarded-For` (the hop closest to the client), then `X-Real-IP`,
/// then the transport peer address.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.ip().to_string()
}

/// Extracts the analytics hints recorded with each click.
pub fn click_hints(headers: &HeaderMap, peer: SocketAddr) -> ClickHints {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    ClickHints {
        user_agent: header("user-agent"),
        ip_address: Some(client_identity(headers, peer)),
        referer: header("referer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.0.2.10:42123".parse().unwrap()
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1, 10.0.0.2"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(client_identity(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn forwarded_for_entries_are_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("  203.0.113.7 ,10.0.0.1"),
        );
        assert_eq!(client_identity(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn empty_forwarded_for_falls_through_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , "));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(client_identity(&headers, peer()), "198.51.100.4");
    }

    #[test]
    fn falls_back_to_the_transport_peer() {
        assert_eq!(client_identity(&HeaderMap::new(), peer()), "192.0.2.10");
    }

    #[test]
    fn hints_carry_agent_referer_and_identity() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("test-agent/1.0"));
        headers.insert("referer", HeaderValue::from_static("https://ref.example"));

        let hints = click_hints(&headers, peer());
        assert_eq!(hints.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(hints.referer.as_deref(), Some("https://ref.example"));
        assert_eq!(hints.ip_address.as_deref(), Some("192.0.2.10"));
    }
}
