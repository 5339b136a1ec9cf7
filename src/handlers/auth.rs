//! # Authentication Handlers
//!
//! Login initiation, provider callback, session introspection, and logout.
//!
//! Browser clients get redirects and cookies; clients sending
//! `Accept: application/json` get JSON bodies instead. Handshake failures
//! surface as one generic `authentication_failed` indicator so a caller
//! cannot probe which step rejected them.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use utoipa::ToSchema;

use crate::auth::{CurrentSession, SESSION_COOKIE, STATE_COOKIE, client_address};
use crate::error::{ApiError, AuthFlowError};
use crate::rate_limit::Decision;
use crate::server::AppState;
use crate::session::ClientMeta;

/// Authorization URL response for API clients
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Complete provider authorization URL for user redirection
    pub auth_url: String,
}

/// Session introspection response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Owning user ID
    pub user_id: uuid::Uuid,
    /// When the session was created
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the session expires (may slide forward on activity)
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Last validated activity
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// Query parameters delivered by the provider redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Error code the provider reports instead of an authorization code.
    pub error: Option<String>,
}

/// Start a login
///
/// Rate-limited per client address. Generates handshake state, sets the
/// short-lived state cookie, and points the client at the provider's
/// authorization endpoint.
#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 200, description = "Authorization URL for API clients", body = LoginResponse),
        (status = 307, description = "Redirect to the provider authorization endpoint"),
        (status = 429, description = "Too many login attempts", body = ApiError),
        (status = 502, description = "Identity provider unavailable", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let key = client_address(&headers, Some(peer));

    if let Decision::Limited {
        retry_after_seconds,
    } = state.rate_limiter.allow(&key)
    {
        tracing::warn!(client = %key, retry_after_seconds, "Login rate limit exceeded");
        if wants_json(&headers) {
            return Err(AuthFlowError::RateLimitExceeded {
                retry_after_seconds,
            }
            .into());
        }
        return Ok(Redirect::temporary("/?error=rate_limit_exceeded").into_response());
    }

    let initiation = state.coordinator.login_initiate().await?;

    let jar = jar.add(state_cookie(
        &initiation.state_token,
        initiation.state_ttl_seconds,
        state.config.session.secure_cookies,
    ));

    if wants_json(&headers) {
        let body = Json(LoginResponse {
            auth_url: initiation.auth_url.to_string(),
        });
        Ok((jar, body).into_response())
    } else {
        Ok((jar, Redirect::temporary(initiation.auth_url.as_str())).into_response())
    }
}

/// Provider callback
///
/// Completes the handshake: verifies the state cookie against the query
/// parameter, consumes the stored state, exchanges the code, and issues a
/// session. Every failure collapses into one generic indicator.
#[utoipa::path(
    get,
    path = "/auth/callback",
    responses(
        (status = 303, description = "Session issued; redirect to the application root"),
        (status = 401, description = "Authentication failed", body = ApiError),
        (status = 502, description = "Identity provider unavailable", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn callback(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    // The state cookie is single-use whatever the outcome.
    let state_cookie_value = jar
        .get(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let jar = jar.remove(expired_state_cookie());

    if let Some(provider_error) = query.error.as_deref() {
        tracing::warn!(provider_error, "Provider reported an authorization error");
        return Ok(failure_response(
            &headers,
            jar,
            AuthFlowError::InvalidGrant(provider_error.to_string()),
        ));
    }

    let (Some(code), Some(state_param)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Ok(failure_response(&headers, jar, AuthFlowError::StateInvalid));
    };

    let client = ClientMeta {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip_address: Some(client_address(&headers, Some(peer))),
    };

    match state
        .coordinator
        .callback(code, state_param, state_cookie_value.as_deref(), client)
        .await
    {
        Ok(success) => {
            let jar = jar.add(session_cookie(
                &success.session.token,
                state.config.session.ttl_seconds,
                state.config.session.secure_cookies,
            ));
            Ok((jar, Redirect::to("/")).into_response())
        }
        Err(err) => Ok(failure_response(&headers, jar, err)),
    }
}

/// Inspect the current session
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session details", body = SessionResponse),
        (status = 401, description = "Missing or invalid session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn session_info(CurrentSession(session): CurrentSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: session.user_id,
        created_at: session.created_at,
        expires_at: session.expires_at,
        last_activity: session.last_activity,
    })
}

/// Log out
///
/// Terminates the session named by the cookie and clears it. Idempotent:
/// logging out without a live session succeeds with the same status, so the
/// response cannot be used to probe token validity.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session terminated (or was already gone)"),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.terminate_session(cookie.value()).await?;
    }

    let jar = jar.remove(expired_session_cookie());
    Ok((jar, StatusCode::NO_CONTENT).into_response())
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Collapse a callback failure into the generic indicator. Provider outages
/// keep their own code so clients know to retry instead of re-consenting.
fn failure_response(headers: &HeaderMap, jar: CookieJar, err: AuthFlowError) -> Response {
    if wants_json(headers) {
        let api_error: ApiError = err.into();
        return (jar, api_error).into_response();
    }

    let indicator = match &err {
        AuthFlowError::ProviderUnavailable(_) => "provider_unavailable",
        _ => "authentication_failed",
    };
    // Logged with the specific cause; the client only sees the indicator.
    tracing::warn!(error = %err, "Callback failed");
    (jar, Redirect::to(&format!("/?error={indicator}"))).into_response()
}

fn state_cookie(token: &str, ttl_seconds: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/auth")
        .max_age(Duration::seconds(ttl_seconds as i64))
        .build()
}

fn session_cookie(token: &str, ttl_seconds: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(ttl_seconds as i64))
        .build()
}

fn expired_state_cookie() -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, "")).path("/auth").build()
}

fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_json_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );
        assert!(wants_json(&headers));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("token-value", 86_400, true);
        assert!(cookie.http_only().unwrap_or(false));
        assert!(cookie.secure().unwrap_or(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(86_400)));

        let state = state_cookie("state-value", 300, false);
        assert_eq!(state.path(), Some("/auth"));
        assert_eq!(state.max_age(), Some(Duration::seconds(300)));
    }
}
