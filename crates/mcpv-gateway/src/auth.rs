//! Bearer-token enforcement for non-loopback callers.

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::state::GatewayState;

/// Axum middleware: reject requests that present neither a matching bearer
/// token nor a loopback peer address.
pub async fn require_bearer_unless_loopback(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if GatewayState::is_loopback_ok(&state, peer, &headers) {
        return Ok(next.run(request).await);
    }
    Err(StatusCode::UNAUTHORIZED)
}

impl GatewayState {
    fn is_loopback_ok(state: &GatewayState, peer: SocketAddr, headers: &HeaderMap) -> bool {
        if crate::state::GatewayConfig::is_loopback(peer.ip()) {
            return true;
        }
        let presented = bearer_token(headers);
        state.config.accepts_token(presented.as_deref())
    }
}

/// Extract the bearer token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer secret123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("secret123".to_string()));
    }

    #[test]
    fn non_bearer_scheme_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn loopback_v4_and_v6_both_recognized() {
        use std::net::IpAddr;
        assert!(crate::state::GatewayConfig::is_loopback("127.0.0.1".parse::<IpAddr>().unwrap()));
        assert!(crate::state::GatewayConfig::is_loopback("::1".parse::<IpAddr>().unwrap()));
        assert!(!crate::state::GatewayConfig::is_loopback("10.0.0.5".parse::<IpAddr>().unwrap()));
    }
}
