use sea_orm::entity::prelude::*;

/// Pending email change: links an identity, the desired new address, and the
/// confirmation token. Deleted atomically with the token on confirm/expiry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "email_change_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub identity_id: Uuid,
    pub new_email: String,
    pub token_id: Uuid,
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
    #[sea_orm(
        belongs_to = "super::one_time_tokens::Entity",
        from = "Column::TokenId",
        to = "super::one_time_tokens::Column::Id"
    )]
    Token,
}

impl ActiveModelBehavior for ActiveModel {}
