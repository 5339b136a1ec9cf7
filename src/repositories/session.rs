//! # Session Repository
//!
//! Database operations for authenticated sessions. Token uniqueness is
//! enforced by the store's unique index; the service layer retries creation
//! on a collision.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, Unchanged};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::session::{ActiveModel, Column, Entity, Model};

/// Parameters for inserting a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub access_token_ciphertext: Option<Vec<u8>>,
    pub refresh_token_ciphertext: Option<Vec<u8>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Repository for session database operations
pub struct SessionRepository {
    db: Arc<DatabaseConnection>,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a session row. A unique-violation on the token column bubbles
    /// up as `DbErr` for the caller's collision retry.
    pub async fn insert(&self, new_session: NewSession) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();

        let row = ActiveModel {
            id: Set(new_session.id),
            token: Set(new_session.token.clone()),
            user_id: Set(new_session.user_id),
            access_token_ciphertext: Set(new_session.access_token_ciphertext.clone()),
            refresh_token_ciphertext: Set(new_session.refresh_token_ciphertext.clone()),
            token_expires_at: Set(new_session.token_expires_at),
            expires_at: Set(new_session.expires_at),
            last_activity: Set(now),
            user_agent: Set(new_session.user_agent.clone()),
            ip_address: Set(new_session.ip_address.clone()),
            created_at: Set(now),
        };

        Entity::insert(row)
            .exec_without_returning(&*self.db)
            .await?;

        Ok(Model {
            id: new_session.id,
            token: new_session.token,
            user_id: new_session.user_id,
            access_token_ciphertext: new_session.access_token_ciphertext,
            refresh_token_ciphertext: new_session.refresh_token_ciphertext,
            token_expires_at: new_session.token_expires_at,
            expires_at: new_session.expires_at,
            last_activity: now,
            user_agent: new_session.user_agent,
            ip_address: new_session.ip_address,
            created_at: now,
        })
    }

    /// Find a session by its opaque token.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::Token.eq(token))
            .one(&*self.db)
            .await
    }

    /// Update activity bookkeeping after a successful validation, optionally
    /// sliding the session expiry forward. Returns `false` when the row no
    /// longer exists (deleted concurrently between lookup and update).
    pub async fn touch(
        &self,
        session_id: Uuid,
        last_activity: DateTime<Utc>,
        new_expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sea_orm::DbErr> {
        let mut row = ActiveModel {
            id: Unchanged(session_id),
            last_activity: Set(last_activity),
            ..Default::default()
        };
        if let Some(expires_at) = new_expires_at {
            row.expires_at = Set(expires_at);
        }

        match Entity::update(row).exec(&*self.db).await {
            Ok(_) => Ok(true),
            Err(sea_orm::DbErr::RecordNotUpdated) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Replace the stored provider access token and its expiry. Returns
    /// `false` when the row no longer exists.
    pub async fn update_access_token(
        &self,
        session_id: Uuid,
        access_token_ciphertext: Option<Vec<u8>>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sea_orm::DbErr> {
        let row = ActiveModel {
            id: Unchanged(session_id),
            access_token_ciphertext: Set(access_token_ciphertext),
            token_expires_at: Set(token_expires_at),
            ..Default::default()
        };

        match Entity::update(row).exec(&*self.db).await {
            Ok(_) => Ok(true),
            Err(sea_orm::DbErr::RecordNotUpdated) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete a session by token. Deleting an absent token is not an error;
    /// the count only feeds logging.
    pub async fn delete_by_token(&self, token: &str) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::Token.eq(token))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete a session by id.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Delete every session belonging to a user (provider-side revocation).
    pub async fn delete_by_user(&self, user_id: Uuid) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Clean up expired sessions, returning the number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
