//! Database migrations for the authgate service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_users;
mod m2026_01_10_000200_create_oauth_states;
mod m2026_01_10_000300_create_sessions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_users::Migration),
            Box::new(m2026_01_10_000200_create_oauth_states::Migration),
            Box::new(m2026_01_10_000300_create_sessions::Migration),
        ]
    }
}
