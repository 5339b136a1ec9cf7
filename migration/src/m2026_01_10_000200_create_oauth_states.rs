use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db_backend = manager.get_database_backend();

        if db_backend == sea_orm::DatabaseBackend::Sqlite {
            // SQLite-compatible version using TEXT for UUID columns
            manager
                .create_table(
                    Table::create()
                        .table(OAuthState::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OAuthState::Id)
                                .text()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OAuthState::State).string().not_null())
                        .col(ColumnDef::new(OAuthState::CodeVerifier).string().not_null())
                        .col(ColumnDef::new(OAuthState::RedirectUri).string().not_null())
                        .col(ColumnDef::new(OAuthState::ExpiresAt).timestamp().not_null())
                        .col(
                            ColumnDef::new(OAuthState::CreatedAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;
        } else {
            // PostgreSQL version with proper UUID and timestamptz support
            manager
                .create_table(
                    Table::create()
                        .table(OAuthState::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OAuthState::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OAuthState::State).string().not_null())
                        .col(ColumnDef::new(OAuthState::CodeVerifier).string().not_null())
                        .col(ColumnDef::new(OAuthState::RedirectUri).string().not_null())
                        .col(
                            ColumnDef::new(OAuthState::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OAuthState::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;
        }

        // Unique state token; the consume path relies on this column to
        // guarantee at most one successful consumption per token.
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_state")
                    .table(OAuthState::Table)
                    .col(OAuthState::State)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index on expires_at for the cleanup sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_expires_at")
                    .table(OAuthState::Table)
                    .col(OAuthState::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OAuthState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthState {
    #[sea_orm(iden = "oauth_states")]
    Table,
    Id,
    State,
    CodeVerifier,
    RedirectUri,
    ExpiresAt,
    CreatedAt,
}
