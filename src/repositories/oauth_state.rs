//! # OAuth State Repository
//!
//! Database operations for in-flight login attempts. Consumption is a
//! find-then-conditional-delete on the unique state column: at most one
//! caller observes the delete as effective, so a replayed token always sees
//! the row as absent.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::MAX_STATE_TTL_SECONDS;
use crate::models::oauth_state::{ActiveModel, Column, Entity, Model};

/// Result of attempting to consume a state token.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// The state was valid and has been deleted; no other caller got it.
    Consumed(Model),
    /// The row existed but was past its expiry; it has been deleted.
    Expired,
    /// No row for this token (never existed, already consumed, or swept).
    Missing,
}

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new OAuth state record.
    ///
    /// The requested TTL is clamped to the 5-minute hard cap whatever the
    /// configuration says.
    pub async fn create(
        &self,
        state: &str,
        code_verifier: &str,
        redirect_uri: &str,
        ttl_seconds: u64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        let ttl = ttl_seconds.min(MAX_STATE_TTL_SECONDS);
        let expires_at = now + Duration::seconds(ttl as i64);

        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            state: Set(state.to_string()),
            code_verifier: Set(code_verifier.to_string()),
            redirect_uri: Set(redirect_uri.to_string()),
            expires_at: Set(expires_at),
            created_at: Set(now),
        };

        // exec_without_returning sidesteps SeaORM's UUID last-insert-id
        // unpacking on SQLite; the model is assembled locally instead.
        let model = Model {
            id: row.id.clone().unwrap(),
            state: row.state.clone().unwrap(),
            code_verifier: row.code_verifier.clone().unwrap(),
            redirect_uri: row.redirect_uri.clone().unwrap(),
            expires_at,
            created_at: now,
        };

        Entity::insert(row)
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Atomically consume a state token.
    ///
    /// The delete is keyed on the row id; when two callbacks race on the same
    /// token, exactly one delete reports an affected row and the loser
    /// observes [`ConsumeOutcome::Missing`]. Expired rows are also deleted
    /// here so a probe after the TTL leaves nothing behind.
    pub async fn consume(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, sea_orm::DbErr> {
        let row = Entity::find()
            .filter(Column::State.eq(state))
            .one(&*self.db)
            .await?;

        let Some(row) = row else {
            return Ok(ConsumeOutcome::Missing);
        };

        let delete = Entity::delete_by_id(row.id).exec(&*self.db).await?;
        if delete.rows_affected == 0 {
            // Lost the race to a concurrent callback.
            return Ok(ConsumeOutcome::Missing);
        }

        if row.is_expired_at(now) {
            return Ok(ConsumeOutcome::Expired);
        }

        Ok(ConsumeOutcome::Consumed(row))
    }

    /// Delete a specific OAuth state by ID (used when a login initiation
    /// fails partway and the row should not linger).
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Clean up expired OAuth states, returning the number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
