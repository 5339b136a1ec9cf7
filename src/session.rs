//! # Session Service
//!
//! Issues, validates, refreshes, and terminates authenticated sessions.
//!
//! State machine per session: `Created -> Active -> {Active (extended),
//! Expired (terminal, auto-deleted), Revoked (terminal, explicit)}`.
//! Expired sessions are deleted during validation, so neither validation nor
//! refresh can resurrect them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::crypto::{self, CryptoKey};
use crate::error::{AuthFlowError, is_unique_violation};
use crate::models::session::Model as SessionModel;
use crate::repositories::session::{NewSession, SessionRepository};

/// Attempts before giving up on a token collision. Collisions on 256 bits of
/// randomness mean something is broken, not unlucky.
const MAX_TOKEN_COLLISION_RETRIES: usize = 3;

/// Client metadata captured when a session is created.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Provider tokens to store on a new session.
#[derive(Debug, Clone, Default)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Service owning the session lifecycle.
pub struct SessionService {
    repo: SessionRepository,
    crypto_key: CryptoKey,
    config: SessionConfig,
}

impl SessionService {
    /// Create a new session service.
    pub fn new(repo: SessionRepository, crypto_key: CryptoKey, config: SessionConfig) -> Self {
        Self {
            repo,
            crypto_key,
            config,
        }
    }

    /// Session TTL as a chrono duration.
    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_seconds as i64)
    }

    /// Issue a new session for `user_id`.
    ///
    /// Provider tokens, when present, are encrypted with the session-bound
    /// AAD before they touch the store. Token generation is collision
    /// resistant; the store's unique index is the backstop, and an insert
    /// that trips it is retried with a fresh token.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        tokens: ProviderTokens,
        client: ClientMeta,
    ) -> Result<SessionModel, AuthFlowError> {
        // Invariant: a stored access token always carries an expiry. A
        // provider response without `expires_in` gets an expiry of now, so
        // the token is immediately due for refresh.
        let token_expires_at = match (&tokens.access_token, tokens.token_expires_at) {
            (Some(_), None) => {
                warn!(user_id = %user_id, "Access token without expiry; marking due for refresh");
                Some(Utc::now())
            }
            (_, expiry) => expiry,
        };

        let expires_at = Utc::now() + self.ttl();

        for attempt in 0..MAX_TOKEN_COLLISION_RETRIES {
            let session_id = Uuid::new_v4();
            let token = generate_session_token();

            let (access_ct, refresh_ct) = crypto::encrypt_session_tokens(
                &self.crypto_key,
                session_id,
                user_id,
                tokens.access_token.as_deref(),
                tokens.refresh_token.as_deref(),
            )?;

            let new_session = NewSession {
                id: session_id,
                token,
                user_id,
                access_token_ciphertext: access_ct,
                refresh_token_ciphertext: refresh_ct,
                token_expires_at,
                expires_at,
                user_agent: client.user_agent.clone(),
                ip_address: client.ip_address.clone(),
            };

            match self.repo.insert(new_session).await {
                Ok(session) => {
                    info!(
                        user_id = %user_id,
                        session_id = %session.id,
                        expires_at = %session.expires_at,
                        "Session created"
                    );
                    return Ok(session);
                }
                Err(err) if is_unique_violation(&err) && attempt + 1 < MAX_TOKEN_COLLISION_RETRIES => {
                    warn!(attempt, "Session token collision; regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        unreachable!("collision retry loop always returns");
    }

    /// Validate a session token.
    ///
    /// Fails with `SessionNotFound` when absent and `SessionExpired` when
    /// past expiry; an expired row is deleted on the spot so it can never be
    /// validated or refreshed again. On success, `last_activity` is bumped
    /// and, inside the renewal window, the expiry slides to `now + TTL`.
    pub async fn validate_session(&self, token: &str) -> Result<SessionModel, AuthFlowError> {
        let Some(mut session) = self.repo.find_by_token(token).await? else {
            return Err(AuthFlowError::SessionNotFound);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            let _ = self.repo.delete_by_id(session.id).await?;
            debug!(session_id = %session.id, "Expired session deleted during validation");
            return Err(AuthFlowError::SessionExpired);
        }

        let renewal_window = Duration::seconds(self.config.renewal_window_seconds as i64);
        let new_expiry = if session.expires_at - now <= renewal_window {
            Some(now + self.ttl())
        } else {
            None
        };

        // The row can be deleted between lookup and touch (concurrent
        // logout); that session is gone, not a store failure.
        if !self.repo.touch(session.id, now, new_expiry).await? {
            return Err(AuthFlowError::SessionNotFound);
        }

        session.last_activity = now;
        if let Some(expires_at) = new_expiry {
            debug!(session_id = %session.id, expires_at = %expires_at, "Session extended");
            session.expires_at = expires_at;
        }

        Ok(session)
    }

    /// Replace the provider access token on a live session.
    ///
    /// Terminated or expired sessions fail with `SessionNotFound` /
    /// `SessionExpired`; termination is permanent and cannot be undone by a
    /// refresh.
    pub async fn refresh_session(
        &self,
        token: &str,
        new_access_token: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<SessionModel, AuthFlowError> {
        let Some(session) = self.repo.find_by_token(token).await? else {
            return Err(AuthFlowError::SessionNotFound);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            let _ = self.repo.delete_by_id(session.id).await?;
            return Err(AuthFlowError::SessionExpired);
        }

        let (access_ct, _) = crypto::encrypt_session_tokens(
            &self.crypto_key,
            session.id,
            session.user_id,
            Some(new_access_token),
            None,
        )?;

        if !self
            .repo
            .update_access_token(session.id, access_ct.clone(), Some(new_expiry))
            .await?
        {
            return Err(AuthFlowError::SessionNotFound);
        }

        debug!(session_id = %session.id, token_expires_at = %new_expiry, "Provider token refreshed");

        Ok(SessionModel {
            access_token_ciphertext: access_ct,
            token_expires_at: Some(new_expiry),
            ..session
        })
    }

    /// Terminate a session. Idempotent: terminating an absent token is not
    /// an error, so error codes cannot be used as a token-existence oracle.
    pub async fn terminate_session(&self, token: &str) -> Result<(), AuthFlowError> {
        let deleted = self.repo.delete_by_token(token).await?;
        if deleted > 0 {
            info!("Session terminated");
        } else {
            debug!("Termination requested for absent session token");
        }
        Ok(())
    }

    /// Terminate every session for a user (provider-side revocation).
    pub async fn terminate_user_sessions(&self, user_id: Uuid) -> Result<u64, AuthFlowError> {
        let deleted = self.repo.delete_by_user(user_id).await?;
        if deleted > 0 {
            info!(user_id = %user_id, count = deleted, "User sessions revoked");
        }
        Ok(deleted)
    }

    /// Whether the session's provider access token should be refreshed now.
    pub fn needs_refresh(&self, session: &SessionModel) -> bool {
        session.needs_refresh(
            Utc::now(),
            Duration::seconds(self.config.refresh_lookahead_seconds as i64),
        )
    }

    /// Decrypt the stored provider access token for outbound use.
    pub fn decrypt_access_token(
        &self,
        session: &SessionModel,
    ) -> Result<Option<String>, AuthFlowError> {
        session
            .access_token_ciphertext
            .as_deref()
            .map(|ct| {
                crypto::decrypt_session_token(&self.crypto_key, session.id, session.user_id, ct)
            })
            .transpose()
            .map_err(Into::into)
    }
}

/// Generate an opaque session token: 32 bytes of OS randomness, base64-url
/// encoded (43 chars).
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length_and_charset() {
        let token = generate_session_token();
        assert!(token.len() >= 32);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_session_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
