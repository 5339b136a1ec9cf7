//! # Session Model
//!
//! Server-side record of an authenticated client, referenced by an opaque
//! token held in the session cookie. Provider tokens are stored as AES-GCM
//! ciphertexts; see `crate::crypto`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity representing one authenticated client session
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Opaque session token held client-side (unique)
    pub token: String,

    /// Owning user
    pub user_id: Uuid,

    /// Encrypted provider access token (absent for non-OAuth sessions)
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted provider refresh token
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Expiry of the provider access token; set whenever an access token is stored
    pub token_expires_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Session expiry (creation + session TTL, slid forward on validation)
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// Last successful validation
    pub last_activity: chrono::DateTime<chrono::Utc>,

    /// User agent captured at creation
    pub user_agent: Option<String>,

    /// Client address captured at creation
    pub ip_address: Option<String>,

    /// When the session was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this session is past its expiry at the given instant.
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the stored provider access token needs refreshing: an access
    /// token is present and its expiry falls within the lookahead window of
    /// `now`, or has already passed.
    pub fn needs_refresh(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        lookahead: chrono::Duration,
    ) -> bool {
        if self.access_token_ciphertext.is_none() {
            return false;
        }
        match self.token_expires_at {
            Some(token_expires_at) => token_expires_at <= now + lookahead,
            None => false,
        }
    }
}
