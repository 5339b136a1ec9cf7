//! # OAuth State Model
//!
//! This module contains the OAuth state entity for storing in-flight login
//! attempts: the CSRF state token, the PKCE verifier bound to it, and the
//! redirect URI the attempt was initiated with.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth state entity representing one in-flight login attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// State token generated for CSRF protection (unique)
    pub state: String,

    /// PKCE code verifier bound to this attempt
    pub code_verifier: String,

    /// Redirect URI the login was initiated with (whitelist-validated)
    pub redirect_uri: String,

    /// Expiration timestamp (creation + state TTL, capped at 5 minutes)
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// When the state was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this state row is past its expiry at the given instant.
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }
}
