use sea_orm_migration::prelude::*;

use crate::m20260801_000001_create_identities::Identities;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TotpCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TotpCredentials::IdentityId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TotpCredentials::Secret).string().not_null())
                    .col(
                        ColumnDef::new(TotpCredentials::Algorithm)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TotpCredentials::Digits)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TotpCredentials::StepSeconds)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TotpCredentials::ConfirmedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TotpCredentials::LastUsedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(TotpCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TotpCredentials::Table, TotpCredentials::IdentityId)
                            .to(Identities::Table, Identities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TotpCredentials::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TotpCredentials {
    Table,
    IdentityId,
    Secret,
    Algorithm,
    Digits,
    StepSeconds,
    ConfirmedAt,
    LastUsedAt,
    CreatedAt,
}
