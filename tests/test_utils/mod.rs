//! Test utilities for database testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations for testing purposes.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::Arc;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixtures can be inserted without the full relation graph.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Sets up an in-memory SQLite database and returns it Arc-wrapped.
#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Inserts a user row directly, returning its ID.
#[allow(dead_code)]
pub async fn insert_test_user(db: &DatabaseConnection, subject: &str) -> Result<Uuid> {
    use authgate::models::user;
    use sea_orm::{EntityTrait, Set};

    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    let row = user::ActiveModel {
        id: Set(id),
        provider_subject: Set(subject.to_string()),
        email: Set(format!("{subject}@example.com")),
        email_verified: Set(true),
        display_name: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    user::Entity::insert(row).exec_without_returning(db).await?;

    Ok(id)
}

/// A 32-byte key for token encryption in tests.
#[allow(dead_code)]
pub fn test_crypto_key() -> Vec<u8> {
    vec![7u8; 32]
}
