//! # User Model
//!
//! Minimal user identity record mapped from the external identity provider.
//! The provider subject is the identity key; email is informational and may
//! repeat across subjects.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity holding provider identity fields
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Stable subject identifier issued by the identity provider (unique)
    pub provider_subject: String,

    /// Email address reported by the provider
    pub email: String,

    /// Whether the provider attested the email as verified
    pub email_verified: bool,

    /// Display name reported by the provider (optional)
    pub display_name: Option<String>,

    /// When the user record was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the user record was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::session::Entity")]
    Session,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
