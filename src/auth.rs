//! # Session Authentication
//!
//! Cookie-based session authentication for protected endpoints, plus the
//! client-address derivation used to key the login rate limiter.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;

use crate::error::{ApiError, unauthorized};
use crate::models::session::Model as SessionModel;
use crate::server::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "authgate_session";

/// Name of the short-lived handshake state cookie.
pub const STATE_COOKIE: &str = "authgate_oauth_state";

/// The validated session attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionModel);

/// Middleware that validates the session cookie and attaches the session to
/// the request. Validation bumps activity and may slide the expiry, so a
/// request passing through here keeps its session alive.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Err(unauthorized(Some("Missing session cookie")));
    };

    let session = state.sessions.validate_session(cookie.value()).await?;

    let mut request = request;
    request.extensions_mut().insert(CurrentSession(session));

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

/// Derive the rate-limit key for a request: the first hop of
/// `X-Forwarded-For` when present, otherwise the peer address.
///
/// The first hop is attacker-controlled when no trusted proxy strips it;
/// deployments without one should rely on the peer address by not
/// forwarding the header.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        let first_hop = forwarded.split(',').next().unwrap_or("").trim();
        if !first_hop.is_empty() {
            return first_hop.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.0.2.7:4455".parse().expect("socket addr")
    }

    #[test]
    fn test_forwarded_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_address(&headers, Some(peer())), "203.0.113.9");
    }

    #[test]
    fn test_peer_address_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_address(&headers, Some(peer())), "192.0.2.7");
    }

    #[test]
    fn test_empty_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_address(&headers, Some(peer())), "192.0.2.7");
    }

    #[test]
    fn test_no_peer_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_address(&headers, None), "unknown");
    }
}
