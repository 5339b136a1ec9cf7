//! # User Repository
//!
//! Lookup-or-create of user records keyed by the provider subject. The
//! create path is not race-free on its own; the unique index on
//! `provider_subject` is the authority, and a violation on insert is retried
//! as a lookup.

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::user::{ActiveModel, Column, Entity, Model};

/// Identity fields reported by the provider after a successful exchange.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Tagged result of the upsert, so callers branch on one explicit variant
/// instead of sniffing for pre-existing rows.
#[derive(Debug)]
pub enum UpsertOutcome {
    /// A new user record was created for this identity.
    Created(Model),
    /// An existing record mapped to the identity (auto-login).
    Reused(Model),
}

impl UpsertOutcome {
    pub fn into_user(self) -> Model {
        match self {
            UpsertOutcome::Created(user) | UpsertOutcome::Reused(user) => user,
        }
    }
}

/// Repository for user identity records
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by primary key.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    /// Find a user by provider subject.
    pub async fn find_by_provider_subject(
        &self,
        subject: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::ProviderSubject.eq(subject))
            .one(&*self.db)
            .await
    }

    /// Look up the user mapped to this provider identity, creating one when
    /// none exists. A unique violation on the insert means another request
    /// created the row first; the lookup is re-run and the existing user is
    /// reported as [`UpsertOutcome::Reused`].
    pub async fn find_or_create_by_provider_identity(
        &self,
        identity: &ProviderIdentity,
    ) -> Result<UpsertOutcome, sea_orm::DbErr> {
        if let Some(existing) = self.find_by_provider_subject(&identity.subject).await? {
            return Ok(UpsertOutcome::Reused(existing));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let row = ActiveModel {
            id: Set(id),
            provider_subject: Set(identity.subject.clone()),
            email: Set(identity.email.clone()),
            email_verified: Set(identity.email_verified),
            display_name: Set(identity.display_name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match Entity::insert(row).exec_without_returning(&*self.db).await {
            Ok(_) => Ok(UpsertOutcome::Created(Model {
                id,
                provider_subject: identity.subject.clone(),
                email: identity.email.clone(),
                email_verified: identity.email_verified,
                display_name: identity.display_name.clone(),
                created_at: now,
                updated_at: now,
            })),
            Err(err) if is_unique_violation(&err) => {
                match self.find_by_provider_subject(&identity.subject).await? {
                    Some(existing) => Ok(UpsertOutcome::Reused(existing)),
                    // Row vanished between the violation and the re-read;
                    // surface the original error rather than looping.
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}
