use sea_orm::entity::prelude::*;

/// An account. `session_version` is bumped on password change, email change,
/// and logout-all; every token embeds the version it was issued under and
/// goes stale when the stored value advances.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "identities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub session_version: i64,
    /// Set when deletion is requested; cleared on cancel.
    pub pending_deletion_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::one_time_tokens::Entity")]
    OneTimeTokens,
    #[sea_orm(has_many = "super::backup_codes::Entity")]
    BackupCodes,
}

impl Related<super::one_time_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OneTimeTokens.def()
    }
}

impl Related<super::backup_codes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BackupCodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
