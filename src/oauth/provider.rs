//! Identity-provider client
//!
//! HTTP client for the OAuth2 authorization-code exchange and the userinfo
//! endpoint. Every call carries the configured deadline so the callback path
//! can never hang on the provider; a timeout surfaces as
//! [`ProviderClientError::Unavailable`], not a fatal error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::ProviderConfig;

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderClientError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("provider rejected the grant with status {status}: {body}")]
    InvalidGrant { status: u16, body: String },

    #[error("provider returned a malformed response: {0}")]
    Malformed(String),

    #[error("provider configuration incomplete: {0}")]
    Misconfigured(String),
}

impl From<reqwest::Error> for ProviderClientError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts and connection failures are both "try again later" from
        // the caller's point of view.
        ProviderClientError::Unavailable(err.to_string())
    }
}

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, when the provider reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Identity claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Stable subject identifier.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

/// Client-side view of the identity provider.
///
/// The coordinator depends on this trait so tests can substitute a scripted
/// provider without network access.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the authorization URL embedding state, PKCE challenge, and scopes.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, ProviderClientError>;

    /// Exchange an authorization code plus PKCE verifier for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, ProviderClientError>;

    /// Fetch identity claims for an access token.
    async fn fetch_identity(&self, access_token: &str) -> Result<UserInfo, ProviderClientError>;
}

/// reqwest-backed provider client built from [`ProviderConfig`].
pub struct OAuth2Provider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
    scopes: String,
    http: reqwest::Client,
}

impl OAuth2Provider {
    /// Build a provider client. Fails when required endpoints or credentials
    /// are missing from the configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderClientError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| ProviderClientError::Misconfigured(format!("{name} is not set")))
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderClientError::Misconfigured(e.to_string()))?;

        Ok(Self {
            client_id: required(&config.client_id, "provider client_id")?,
            client_secret: required(&config.client_secret, "provider client_secret")?,
            redirect_uri: required(&config.redirect_uri, "provider redirect_uri")?,
            authorize_url: required(&config.authorize_url, "provider authorize_url")?,
            token_url: required(&config.token_url, "provider token_url")?,
            userinfo_url: required(&config.userinfo_url, "provider userinfo_url")?,
            scopes: config.scopes.clone(),
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, ProviderClientError> {
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ProviderClientError::Misconfigured(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, ProviderClientError> {
        let mut params = std::collections::HashMap::new();
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("code", code.to_string());
        params.insert("code_verifier", code_verifier.to_string());
        params.insert("redirect_uri", self.redirect_uri.clone());

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let grant: TokenGrant = response
                .json()
                .await
                .map_err(|e| ProviderClientError::Malformed(e.to_string()))?;

            if grant.access_token.is_empty() {
                return Err(ProviderClientError::Malformed(
                    "empty access_token in token response".to_string(),
                ));
            }

            Ok(grant)
        } else if response.status().is_server_error() {
            let status = response.status().as_u16();
            Err(ProviderClientError::Unavailable(format!(
                "token endpoint returned {status}"
            )))
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ProviderClientError::InvalidGrant { status, body })
        }
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<UserInfo, ProviderClientError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ProviderClientError::Malformed(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ProviderClientError::Unavailable(format!(
                "userinfo endpoint returned {status}: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            client_id: Some("client-id".to_string()),
            client_secret: Some("client-secret".to_string()),
            redirect_uri: Some("https://app.example.com/auth/callback".to_string()),
            allowed_redirect_uris: vec![],
            authorize_url: Some("https://idp.example.com/authorize".to_string()),
            token_url: Some("https://idp.example.com/token".to_string()),
            userinfo_url: Some("https://idp.example.com/userinfo".to_string()),
            scopes: "openid email profile".to_string(),
            timeout_ms: 10_000,
        }
    }

    #[test]
    fn test_authorize_url_carries_pkce_and_state() {
        let provider = OAuth2Provider::from_config(&test_config()).expect("valid config");
        let url = provider
            .authorize_url("state-token", "challenge-value")
            .expect("url builds");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("state").map(String::as_str), Some("state-token"));
        assert_eq!(
            pairs.get("code_challenge").map(String::as_str),
            Some("challenge-value")
        );
        assert_eq!(
            pairs.get("code_challenge_method").map(String::as_str),
            Some("S256")
        );
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        let mut config = test_config();
        config.token_url = None;
        assert!(matches!(
            OAuth2Provider::from_config(&config),
            Err(ProviderClientError::Misconfigured(_))
        ));
    }
}
