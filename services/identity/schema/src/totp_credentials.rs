use sea_orm::entity::prelude::*;

/// Per-identity TOTP credential. Created unconfirmed on setup; confirmed
/// only after the identity presents a valid code.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "totp_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub identity_id: Uuid,
    /// Base32-encoded shared secret, no padding.
    pub secret: String,
    pub algorithm: String,
    pub digits: i16,
    pub step_seconds: i32,
    pub confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Timestamp of the last accepted code; used to reject same-step replay.
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::identities::Entity",
        from = "Column::IdentityId",
        to = "super::identities::Column::Id"
    )]
    Identity,
}

impl ActiveModelBehavior for ActiveModel {}
