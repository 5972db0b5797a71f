// Client identifier extraction

use std::net::SocketAddr;

use crate::Headers;

/// Identifier used when neither headers nor transport say who the client is.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the client identifier for a request.
///
/// Order: first `X-Forwarded-For` entry (only when `trust_proxy` is set),
/// then `X-Real-IP`, then the transport peer address.
///
/// `X-Real-IP` is honoured whatever `trust_proxy` says, so a directly
/// connected client can choose its own identifier. Deployments not behind
/// a proxy that overwrites the header should strip it at the edge.
pub fn client_ip(headers: &Headers, remote: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()));
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    if let Some(ip) = headers.get("x-real-ip").map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_string();
    }

    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
