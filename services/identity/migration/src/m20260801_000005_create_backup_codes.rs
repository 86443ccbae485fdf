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
                    .table(BackupCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackupCodes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackupCodes::IdentityId).uuid().not_null())
                    .col(ColumnDef::new(BackupCodes::CodeHash).string().not_null())
                    .col(ColumnDef::new(BackupCodes::UsedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(BackupCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(BackupCodes::Table, BackupCodes::IdentityId)
                            .to(Identities::Table, Identities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(BackupCodes::Table)
                    .col(BackupCodes::IdentityId)
                    .name("idx_backup_codes_identity_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BackupCodes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum BackupCodes {
    Table,
    Id,
    IdentityId,
    CodeHash,
    UsedAt,
    CreatedAt,
}
