//! # OAuth Flow Coordinator
//!
//! Orchestrates the authorization-code+PKCE handshake: login initiation
//! (state + verifier generation, persistence, authorization URL) and the
//! callback exchange (state consumption, code exchange, identity checks,
//! user upsert, session issuance).

pub mod provider;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use url::Url;

use crate::error::AuthFlowError;
use crate::models::session::Model as SessionModel;
use crate::models::user::Model as UserModel;
use crate::oauth::provider::{IdentityProvider, ProviderClientError};
use crate::repositories::oauth_state::{ConsumeOutcome, OAuthStateRepository};
use crate::repositories::user::{ProviderIdentity, UpsertOutcome, UserRepository};
use crate::session::{ClientMeta, ProviderTokens, SessionService};

/// Result of initiating a login.
#[derive(Debug)]
pub struct LoginInitiation {
    /// State token to mirror into the state cookie.
    pub state_token: String,
    /// Provider authorization URL to redirect the client to.
    pub auth_url: Url,
    /// State TTL in seconds, for the cookie Max-Age.
    pub state_ttl_seconds: u64,
}

/// Result of a successful callback.
#[derive(Debug)]
pub struct CallbackSuccess {
    pub session: SessionModel,
    pub user: UserModel,
    /// Whether this login created a user record or reused an existing one.
    pub user_created: bool,
}

/// Coordinates the OAuth handshake across the state store, the identity
/// provider, the user directory, and the session service.
pub struct OAuthFlowCoordinator {
    provider: Arc<dyn IdentityProvider>,
    states: OAuthStateRepository,
    users: UserRepository,
    sessions: Arc<SessionService>,
    redirect_uri: String,
    allowed_redirect_uris: Vec<String>,
    state_ttl_seconds: u64,
}

impl OAuthFlowCoordinator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        states: OAuthStateRepository,
        users: UserRepository,
        sessions: Arc<SessionService>,
        redirect_uri: String,
        allowed_redirect_uris: Vec<String>,
        state_ttl_seconds: u64,
    ) -> Self {
        Self {
            provider,
            states,
            users,
            sessions,
            redirect_uri,
            allowed_redirect_uris,
            state_ttl_seconds,
        }
    }

    /// Initiate a login: generate state + PKCE material, persist the state
    /// row, and build the provider authorization URL.
    pub async fn login_initiate(&self) -> Result<LoginInitiation, AuthFlowError> {
        if !self.allowed_redirect_uris.is_empty()
            && !self
                .allowed_redirect_uris
                .iter()
                .any(|allowed| allowed == &self.redirect_uri)
        {
            // Config validation already enforces this; treat a violation at
            // runtime as a handshake failure rather than panicking.
            warn!(redirect_uri = %self.redirect_uri, "Redirect URI not in whitelist");
            return Err(AuthFlowError::StateInvalid);
        }

        let state_token = generate_state_token();
        let code_verifier = generate_code_verifier();
        let code_challenge = derive_code_challenge(&code_verifier);

        let state_row = self
            .states
            .create(
                &state_token,
                &code_verifier,
                &self.redirect_uri,
                self.state_ttl_seconds,
            )
            .await?;

        let auth_url = match self.provider.authorize_url(&state_token, &code_challenge) {
            Ok(url) => url,
            Err(err) => {
                // Do not leave an orphaned state row behind a failed initiation.
                let _ = self.states.delete_by_id(state_row.id).await;
                return Err(map_provider_error(err));
            }
        };

        info!(state_id = %state_row.id, "Login initiated");

        Ok(LoginInitiation {
            state_token,
            auth_url,
            state_ttl_seconds: self.state_ttl_seconds,
        })
    }

    /// Handle the provider callback.
    ///
    /// `state_cookie` is the value of the state cookie set at initiation;
    /// it must match the `state` query parameter before the store is even
    /// consulted. All failures map to [`AuthFlowError`] variants that the
    /// handler collapses into a generic redirect.
    pub async fn callback(
        &self,
        code: &str,
        state: &str,
        state_cookie: Option<&str>,
        client: ClientMeta,
    ) -> Result<CallbackSuccess, AuthFlowError> {
        // The browser that initiated the login must present the matching
        // cookie; compared in constant time to avoid a timing oracle.
        let cookie_matches = state_cookie.is_some_and(|cookie| {
            ConstantTimeEq::ct_eq(cookie.as_bytes(), state.as_bytes()).into()
        });
        if !cookie_matches {
            return Err(AuthFlowError::StateInvalid);
        }

        let state_row = match self.states.consume(state, Utc::now()).await? {
            ConsumeOutcome::Consumed(row) => row,
            ConsumeOutcome::Expired => return Err(AuthFlowError::StateExpired),
            ConsumeOutcome::Missing => return Err(AuthFlowError::StateInvalid),
        };

        let grant = self
            .provider
            .exchange_code(code, &state_row.code_verifier)
            .await
            .map_err(map_provider_error)?;

        let claims = self
            .provider
            .fetch_identity(&grant.access_token)
            .await
            .map_err(map_provider_error)?;

        let email = claims.email.as_deref().unwrap_or_default();
        if email.is_empty() || !claims.email_verified {
            // Nothing has been persisted at this point; bail before the
            // user upsert.
            return Err(AuthFlowError::UnverifiedIdentity);
        }

        let identity = ProviderIdentity {
            subject: claims.sub,
            email: email.to_string(),
            email_verified: claims.email_verified,
            display_name: claims.name,
        };

        let outcome = self
            .users
            .find_or_create_by_provider_identity(&identity)
            .await?;
        let user_created = matches!(outcome, UpsertOutcome::Created(_));
        let user = outcome.into_user();

        let token_expires_at = grant
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds as i64));

        let session = self
            .sessions
            .create_session(
                user.id,
                ProviderTokens {
                    access_token: Some(grant.access_token),
                    refresh_token: grant.refresh_token,
                    token_expires_at,
                },
                client,
            )
            .await?;

        info!(
            user_id = %user.id,
            session_id = %session.id,
            user_created,
            "OAuth callback completed"
        );

        Ok(CallbackSuccess {
            session,
            user,
            user_created,
        })
    }
}

fn map_provider_error(err: ProviderClientError) -> AuthFlowError {
    match err {
        ProviderClientError::InvalidGrant { status, body } => {
            AuthFlowError::InvalidGrant(format!("status {status}: {body}"))
        }
        ProviderClientError::Unavailable(detail) => AuthFlowError::ProviderUnavailable(detail),
        ProviderClientError::Malformed(detail) | ProviderClientError::Misconfigured(detail) => {
            AuthFlowError::ProviderUnavailable(detail)
        }
    }
}

/// Generate a CSRF state token: 32 random bytes, base64-url encoded.
fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// Generate a PKCE code verifier: 48 random bytes encode to 64 URL-safe
/// chars, inside the RFC 7636 43-128 char window.
fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 48];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// Derive the S256 code challenge for a verifier.
fn derive_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64_url::encode(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_token_length() {
        let token = generate_state_token();
        assert!(token.len() >= 32);
    }

    #[test]
    fn test_code_verifier_within_rfc_bounds() {
        let verifier = generate_code_verifier();
        assert!((43..=128).contains(&verifier.len()));
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_code_challenge_is_s256_of_verifier() {
        // RFC 7636 appendix B reference vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            derive_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_challenge_differs_from_verifier() {
        let verifier = generate_code_verifier();
        assert_ne!(derive_code_challenge(&verifier), verifier);
    }
}
