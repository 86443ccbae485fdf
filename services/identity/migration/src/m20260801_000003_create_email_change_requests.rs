use sea_orm_migration::prelude::*;

use crate::m20260801_000001_create_identities::Identities;
use crate::m20260801_000002_create_one_time_tokens::OneTimeTokens;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailChangeRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailChangeRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailChangeRequests::IdentityId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailChangeRequests::NewEmail)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailChangeRequests::TokenId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailChangeRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(EmailChangeRequests::Table, EmailChangeRequests::IdentityId)
                            .to(Identities::Table, Identities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(EmailChangeRequests::Table, EmailChangeRequests::TokenId)
                            .to(OneTimeTokens::Table, OneTimeTokens::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(EmailChangeRequests::Table)
                    .col(EmailChangeRequests::IdentityId)
                    .name("idx_email_change_requests_identity_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailChangeRequests::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EmailChangeRequests {
    Table,
    Id,
    IdentityId,
    NewEmail,
    TokenId,
    CreatedAt,
}
