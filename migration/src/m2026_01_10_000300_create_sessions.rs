use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db_backend = manager.get_database_backend();

        if db_backend == sea_orm::DatabaseBackend::Sqlite {
            // SQLite-compatible version using TEXT for UUID and BLOB for ciphertexts
            manager
                .create_table(
                    Table::create()
                        .table(Session::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Session::Id).text().not_null().primary_key())
                        .col(ColumnDef::new(Session::Token).string().not_null())
                        .col(ColumnDef::new(Session::UserId).text().not_null())
                        .col(
                            ColumnDef::new(Session::AccessTokenCiphertext)
                                .binary()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Session::RefreshTokenCiphertext)
                                .binary()
                                .null(),
                        )
                        .col(ColumnDef::new(Session::TokenExpiresAt).timestamp().null())
                        .col(ColumnDef::new(Session::ExpiresAt).timestamp().not_null())
                        .col(ColumnDef::new(Session::LastActivity).timestamp().not_null())
                        .col(ColumnDef::new(Session::UserAgent).string().null())
                        .col(ColumnDef::new(Session::IpAddress).string().null())
                        .col(
                            ColumnDef::new(Session::CreatedAt)
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
                        .table(Session::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Session::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Session::Token).string().not_null())
                        .col(ColumnDef::new(Session::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Session::AccessTokenCiphertext)
                                .binary()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Session::RefreshTokenCiphertext)
                                .binary()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Session::TokenExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Session::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Session::LastActivity)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Session::UserAgent).string().null())
                        .col(ColumnDef::new(Session::IpAddress).string().null())
                        .col(
                            ColumnDef::new(Session::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_foreign_key(
                    ForeignKey::create()
                        .name("fk_sessions_user_id")
                        .from(Session::Table, Session::UserId)
                        .to(User::Table, User::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                        .to_owned(),
                )
                .await?;
        }

        // Unique session token; create_session retries on a collision here.
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_token")
                    .table(Session::Table)
                    .col(Session::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index on expires_at for the cleanup sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_expires_at")
                    .table(Session::Table)
                    .col(Session::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Session::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Session {
    #[sea_orm(iden = "sessions")]
    Table,
    Id,
    Token,
    UserId,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    ExpiresAt,
    LastActivity,
    UserAgent,
    IpAddress,
    CreatedAt,
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
}
