//! Integration tests for the HTTP surface: login redirect and cookies,
//! callback handling, session introspection, logout, and rate limiting.

mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::json;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authgate::config::{AppConfig, ProviderConfig};
use authgate::oauth::provider::{IdentityProvider, OAuth2Provider};
use authgate::server::{AppState, create_app};

const REDIRECT_URI: &str = "https://app.example.com/auth/callback";
const PEER: &str = "198.51.100.4:55001";

async fn test_app(server: &MockServer, mutate: impl FnOnce(&mut AppConfig)) -> Router {
    let db = test_utils::setup_test_db_arc()
        .await
        .expect("set up test db");

    let mut config = AppConfig {
        crypto_key: Some(test_utils::test_crypto_key()),
        provider: ProviderConfig {
            client_id: Some("test-client".to_string()),
            client_secret: Some("test-secret".to_string()),
            redirect_uri: Some(REDIRECT_URI.to_string()),
            allowed_redirect_uris: vec![REDIRECT_URI.to_string()],
            authorize_url: Some(format!("{}/authorize", server.uri())),
            token_url: Some(format!("{}/token", server.uri())),
            userinfo_url: Some(format!("{}/userinfo", server.uri())),
            scopes: "openid email profile".to_string(),
            timeout_ms: 5_000,
        },
        ..AppConfig::default()
    };
    // Plain-HTTP cookies so tests can read them back.
    config.session.secure_cookies = false;
    mutate(&mut config);

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(OAuth2Provider::from_config(&config.provider).expect("provider"));
    let state = AppState::build(Arc::new(config), db, provider).expect("app state");

    create_app(state)
}

async fn mock_provider_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access-token",
            "refresh_token": "provider-refresh-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "subject-1",
            "email": "alice@example.com",
            "email_verified": true,
            "name": "Alice",
        })))
        .mount(server)
        .await;
}

fn request(method: &str, uri: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let peer: SocketAddr = PEER.parse().expect("peer addr");
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

fn with_header(mut req: Request<Body>, name: &'static str, value: &str) -> Request<Body> {
    req.headers_mut()
        .insert(name, value.parse().expect("header value"));
    req
}

/// Extract `name=value` from the response's Set-Cookie headers.
fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let (pair, _) = cookie.split_once(';').unwrap_or((cookie, ""));
            let (cookie_name, cookie_value) = pair.split_once('=')?;
            (cookie_name == name).then(|| cookie_value.to_string())
        })
}

#[tokio::test]
async fn root_returns_service_info() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let response = app.oneshot(request("GET", "/")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let info: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(info["service"], "authgate");
}

#[tokio::test]
async fn login_redirects_to_provider_with_state_cookie() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let response = app
        .oneshot(request("GET", "/auth/login"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header");
    let url = Url::parse(location).expect("valid url");
    assert!(url.as_str().starts_with(&server.uri()));

    let state_param = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state param");

    let cookie = cookie_value(&response, "authgate_oauth_state").expect("state cookie");
    assert_eq!(cookie, state_param);

    let raw_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie");
    assert!(raw_cookie.contains("HttpOnly"));
    assert!(raw_cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn login_returns_json_when_requested() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let req = with_header(
        request("GET", "/auth/login"),
        "accept",
        "application/json",
    );
    let response = app.oneshot(req).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert!(
        payload["auth_url"]
            .as_str()
            .expect("auth_url")
            .contains("code_challenge")
    );
}

#[tokio::test]
async fn login_is_rate_limited_per_client() {
    let server = MockServer::start().await;
    let app = test_app(&server, |config| {
        config.rate_limit.burst = 2;
    })
    .await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("GET", "/auth/login"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    // Browser clients over budget get bounced back with an indicator.
    let limited = app
        .clone()
        .oneshot(request("GET", "/auth/login"))
        .await
        .expect("response");
    assert_eq!(limited.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = limited
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location");
    assert!(location.contains("error=rate_limit_exceeded"));

    // API clients get the 429 with a retry hint.
    let req = with_header(
        request("GET", "/auth/login"),
        "accept",
        "application/json",
    );
    let limited_json = app.clone().oneshot(req).await.expect("response");
    assert_eq!(limited_json.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited_json.headers().contains_key("retry-after"));

    // A different client address still has budget.
    let mut other = request("GET", "/auth/login");
    other = with_header(other, "x-forwarded-for", "203.0.113.77");
    let response = app.oneshot(other).await.expect("response");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(
        !response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location")
            .contains("error=")
    );
}

#[tokio::test]
async fn full_browser_flow_login_callback_session_logout() {
    let server = MockServer::start().await;
    mock_provider_success(&server).await;
    let app = test_app(&server, |_| {}).await;

    // Step 1: login.
    let login = app
        .clone()
        .oneshot(request("GET", "/auth/login"))
        .await
        .expect("login response");
    let state_cookie = cookie_value(&login, "authgate_oauth_state").expect("state cookie");
    let location = login
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location");
    let state_param = Url::parse(location)
        .expect("url")
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state param");

    // Step 2: provider redirects back; the browser carries the state cookie.
    let callback_uri = format!("/auth/callback?code=auth-code&state={state_param}");
    let callback_req = with_header(
        request("GET", &callback_uri),
        "cookie",
        &format!("authgate_oauth_state={state_cookie}"),
    );
    let callback = app
        .clone()
        .oneshot(callback_req)
        .await
        .expect("callback response");
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        callback
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
    let session_token = cookie_value(&callback, "authgate_session").expect("session cookie");

    // Step 3: the session cookie authenticates introspection.
    let session_req = with_header(
        request("GET", "/auth/session"),
        "cookie",
        &format!("authgate_session={session_token}"),
    );
    let session = app
        .clone()
        .oneshot(session_req)
        .await
        .expect("session response");
    assert_eq!(session.status(), StatusCode::OK);

    // Step 4: logout clears the cookie and invalidates the token.
    let logout_req = with_header(
        request("POST", "/auth/logout"),
        "cookie",
        &format!("authgate_session={session_token}"),
    );
    let logout = app
        .clone()
        .oneshot(logout_req)
        .await
        .expect("logout response");
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let after_logout_req = with_header(
        request("GET", "/auth/session"),
        "cookie",
        &format!("authgate_session={session_token}"),
    );
    let after_logout = app
        .oneshot(after_logout_req)
        .await
        .expect("post-logout response");
    assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn callback_without_matching_cookie_fails_generically() {
    let server = MockServer::start().await;
    mock_provider_success(&server).await;
    let app = test_app(&server, |_| {}).await;

    let login = app
        .clone()
        .oneshot(request("GET", "/auth/login"))
        .await
        .expect("login response");
    let location = login
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location");
    let state_param = Url::parse(location)
        .expect("url")
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state param");

    // No cookie at all.
    let callback = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/auth/callback?code=auth-code&state={state_param}"),
        ))
        .await
        .expect("callback response");
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    let location = callback
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location");
    assert!(location.contains("error=authentication_failed"));
    assert!(cookie_value(&callback, "authgate_session").is_none());
}

#[tokio::test]
async fn callback_with_provider_error_fails_generically() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let callback = app
        .oneshot(request("GET", "/auth/callback?error=access_denied"))
        .await
        .expect("callback response");
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    let location = callback
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location");
    assert!(location.contains("error=authentication_failed"));
}

#[tokio::test]
async fn session_endpoint_requires_cookie() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let response = app
        .oneshot(request("GET", "/auth/session"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_session_is_a_no_op() {
    let server = MockServer::start().await;
    let app = test_app(&server, |_| {}).await;

    let response = app
        .clone()
        .oneshot(request("POST", "/auth/logout"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stale = with_header(
        request("POST", "/auth/logout"),
        "cookie",
        "authgate_session=never-issued",
    );
    let response = app.oneshot(stale).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
