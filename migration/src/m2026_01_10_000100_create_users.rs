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
                        .table(User::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(User::Id).text().not_null().primary_key())
                        .col(ColumnDef::new(User::ProviderSubject).string().not_null())
                        .col(ColumnDef::new(User::Email).string().not_null())
                        .col(
                            ColumnDef::new(User::EmailVerified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(User::DisplayName).string().null())
                        .col(
                            ColumnDef::new(User::CreatedAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(User::UpdatedAt)
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
                        .table(User::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(User::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(User::ProviderSubject).string().not_null())
                        .col(ColumnDef::new(User::Email).string().not_null())
                        .col(
                            ColumnDef::new(User::EmailVerified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(User::DisplayName).string().null())
                        .col(
                            ColumnDef::new(User::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(User::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;
        }

        // The provider subject is the identity key: one account per subject.
        // Email is informational and may repeat across subjects.
        manager
            .create_index(
                Index::create()
                    .name("idx_users_provider_subject")
                    .table(User::Table)
                    .col(User::ProviderSubject)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    ProviderSubject,
    Email,
    EmailVerified,
    DisplayName,
    CreatedAt,
    UpdatedAt,
}
