use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use uuid::Uuid;

use gatehouse_identity_schema::{
    backup_codes, email_change_requests, identities, one_time_tokens, totp_credentials,
    user_profiles,
};

use crate::domain::repository::{
    BackupCodeRepository, EmailChangeRepository, IdentityRepository, OneTimeTokenRepository,
    TotpRepository,
};
use crate::domain::types::{
    BackupCode, EmailChangeRequest, Identity, OneTimeToken, OneTimeTokenKind, TotpCredential,
};
use crate::error::IdentityError;

// ── Identity repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbIdentityRepository {
    pub db: DatabaseConnection,
}

impl IdentityRepository for DbIdentityRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        let model = identities::Entity::find()
            .filter(identities::Column::Email.eq(email))
            .one(&self.db)
            .await
            .context("find identity by email")?;
        Ok(model.map(identity_from_model))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError> {
        let model = identities::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find identity by id")?;
        Ok(model.map(identity_from_model))
    }

    async fn display_name(&self, id: Uuid) -> Result<Option<String>, IdentityError> {
        let profile = user_profiles::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user profile")?;
        Ok(profile.and_then(|p| p.display_name))
    }

    async fn create_with_verification(
        &self,
        identity: &Identity,
        token: &OneTimeToken,
    ) -> Result<(), IdentityError> {
        self.db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                let identity = identity.clone();
                let token = token.clone();
                Box::pin(async move {
                    identities::ActiveModel {
                        id: Set(identity.id),
                        email: Set(identity.email.clone()),
                        password_hash: Set(identity.password_hash.clone()),
                        email_verified: Set(false),
                        session_version: Set(0),
                        pending_deletion_at: Set(None),
                        created_at: Set(identity.created_at),
                        updated_at: Set(identity.updated_at),
                    }
                    .insert(txn)
                    .await?;
                    insert_token(txn, &token).await
                })
            })
            .await
            .context("create identity with verification token")?;
        Ok(())
    }

    async fn bump_session_version(&self, id: Uuid) -> Result<(), IdentityError> {
        identities::Entity::update_many()
            .col_expr(
                identities::Column::SessionVersion,
                Expr::col(identities::Column::SessionVersion).add(1),
            )
            .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(identities::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("bump session version")?;
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), IdentityError> {
        let password_hash = password_hash.to_owned();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move { rotate_password(txn, id, &password_hash).await })
            })
            .await
            .context("set password")?;
        Ok(())
    }

    async fn mark_pending_deletion(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError> {
        let jti = reauth_jti.to_owned();
        let marked = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !consume_reauth_row(txn, id, &jti).await? {
                        return Ok(false);
                    }
                    identities::Entity::update_many()
                        .col_expr(
                            identities::Column::PendingDeletionAt,
                            Expr::value(Some(at)),
                        )
                        .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(identities::Column::Id.eq(id))
                        .exec(txn)
                        .await?;
                    Ok(true)
                })
            })
            .await
            .context("mark pending deletion")?;
        Ok(marked)
    }

    async fn clear_pending_deletion(&self, id: Uuid) -> Result<bool, IdentityError> {
        let result = identities::Entity::update_many()
            .col_expr(
                identities::Column::PendingDeletionAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(identities::Column::Id.eq(id))
            .filter(identities::Column::PendingDeletionAt.is_not_null())
            .exec(&self.db)
            .await
            .context("clear pending deletion")?;
        Ok(result.rows_affected == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<(), IdentityError> {
        // Dependent rows go with the identity via FK cascade.
        identities::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("delete identity")?;
        Ok(())
    }
}

// ── One-time token repository ────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOneTimeTokenRepository {
    pub db: DatabaseConnection,
}

impl OneTimeTokenRepository for DbOneTimeTokenRepository {
    async fn create(&self, token: &OneTimeToken) -> Result<(), IdentityError> {
        let token = token.clone();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move { insert_token(txn, &token).await })
            })
            .await
            .context("create one-time token")?;
        Ok(())
    }

    async fn create_superseding(&self, token: &OneTimeToken) -> Result<(), IdentityError> {
        let token = token.clone();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    one_time_tokens::Entity::delete_many()
                        .filter(one_time_tokens::Column::IdentityId.eq(token.identity_id))
                        .filter(one_time_tokens::Column::Kind.eq(token.kind.as_str()))
                        .exec(txn)
                        .await?;
                    insert_token(txn, &token).await
                })
            })
            .await
            .context("create superseding one-time token")?;
        Ok(())
    }

    async fn find(
        &self,
        kind: OneTimeTokenKind,
        value: &str,
    ) -> Result<Option<OneTimeToken>, IdentityError> {
        let model = one_time_tokens::Entity::find()
            .filter(one_time_tokens::Column::Kind.eq(kind.as_str()))
            .filter(one_time_tokens::Column::Value.eq(value))
            .one(&self.db)
            .await
            .context("find one-time token")?;
        model.map(token_from_model).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, IdentityError> {
        let result = one_time_tokens::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("delete one-time token")?;
        Ok(result.rows_affected == 1)
    }

    async fn consume_and_verify_email(
        &self,
        token_id: Uuid,
        identity_id: Uuid,
    ) -> Result<bool, IdentityError> {
        let consumed = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !delete_token(txn, token_id).await? {
                        return Ok(false);
                    }
                    identities::Entity::update_many()
                        .col_expr(identities::Column::EmailVerified, Expr::value(true))
                        .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(identities::Column::Id.eq(identity_id))
                        .exec(txn)
                        .await?;
                    // Provision the profile; re-verification keeps it.
                    user_profiles::Entity::insert(user_profiles::ActiveModel {
                        identity_id: Set(identity_id),
                        display_name: Set(None),
                        created_at: Set(Utc::now()),
                    })
                    .on_conflict(
                        OnConflict::column(user_profiles::Column::IdentityId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await?;
                    Ok(true)
                })
            })
            .await
            .context("consume verification token")?;
        Ok(consumed)
    }

    async fn consume_and_reset_password(
        &self,
        token_id: Uuid,
        identity_id: Uuid,
        new_password_hash: &str,
    ) -> Result<bool, IdentityError> {
        let hash = new_password_hash.to_owned();
        let consumed = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !delete_token(txn, token_id).await? {
                        return Ok(false);
                    }
                    rotate_password(txn, identity_id, &hash).await?;
                    Ok(true)
                })
            })
            .await
            .context("consume password reset token")?;
        Ok(consumed)
    }
}

// ── Email change repository ──────────────────────────────────────────────

#[derive(Clone)]
pub struct DbEmailChangeRepository {
    pub db: DatabaseConnection,
}

impl EmailChangeRepository for DbEmailChangeRepository {
    async fn create_with_reauth(
        &self,
        token: &OneTimeToken,
        request: &EmailChangeRequest,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError> {
        let token = token.clone();
        let request = request.clone();
        let jti = reauth_jti.to_owned();
        let created = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !consume_reauth_row(txn, request.identity_id, &jti).await? {
                        return Ok(false);
                    }
                    insert_token(txn, &token).await?;
                    email_change_requests::ActiveModel {
                        id: Set(request.id),
                        identity_id: Set(request.identity_id),
                        new_email: Set(request.new_email.clone()),
                        token_id: Set(request.token_id),
                        created_at: Set(request.created_at),
                    }
                    .insert(txn)
                    .await?;
                    Ok(true)
                })
            })
            .await
            .context("create email change request")?;
        Ok(created)
    }

    async fn find_by_token(
        &self,
        value: &str,
    ) -> Result<Option<(OneTimeToken, EmailChangeRequest)>, IdentityError> {
        let Some(token_model) = one_time_tokens::Entity::find()
            .filter(one_time_tokens::Column::Kind.eq(OneTimeTokenKind::EmailChange.as_str()))
            .filter(one_time_tokens::Column::Value.eq(value))
            .one(&self.db)
            .await
            .context("find email change token")?
        else {
            return Ok(None);
        };
        let Some(request_model) = email_change_requests::Entity::find()
            .filter(email_change_requests::Column::TokenId.eq(token_model.id))
            .one(&self.db)
            .await
            .context("find email change request")?
        else {
            return Ok(None);
        };
        Ok(Some((
            token_from_model(token_model)?,
            EmailChangeRequest {
                id: request_model.id,
                identity_id: request_model.identity_id,
                new_email: request_model.new_email,
                token_id: request_model.token_id,
                created_at: request_model.created_at,
            },
        )))
    }

    async fn delete_request(&self, request_id: Uuid) -> Result<(), IdentityError> {
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    let Some(request) =
                        email_change_requests::Entity::find_by_id(request_id).one(txn).await?
                    else {
                        return Ok(());
                    };
                    email_change_requests::Entity::delete_by_id(request_id)
                        .exec(txn)
                        .await?;
                    one_time_tokens::Entity::delete_by_id(request.token_id)
                        .exec(txn)
                        .await?;
                    Ok(())
                })
            })
            .await
            .context("delete email change request")?;
        Ok(())
    }

    async fn consume_and_apply(
        &self,
        token_id: Uuid,
        request_id: Uuid,
        identity_id: Uuid,
        new_email: &str,
    ) -> Result<bool, IdentityError> {
        let new_email = new_email.to_owned();
        let applied = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !delete_token(txn, token_id).await? {
                        return Ok(false);
                    }
                    email_change_requests::Entity::delete_by_id(request_id)
                        .exec(txn)
                        .await?;
                    identities::Entity::update_many()
                        .col_expr(identities::Column::Email, Expr::value(new_email.clone()))
                        // Confirming the link proves control of the address.
                        .col_expr(identities::Column::EmailVerified, Expr::value(true))
                        .col_expr(
                            identities::Column::SessionVersion,
                            Expr::col(identities::Column::SessionVersion).add(1),
                        )
                        .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(identities::Column::Id.eq(identity_id))
                        .exec(txn)
                        .await?;
                    Ok(true)
                })
            })
            .await
            .context("apply email change")?;
        Ok(applied)
    }
}

// ── TOTP repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbTotpRepository {
    pub db: DatabaseConnection,
}

impl TotpRepository for DbTotpRepository {
    async fn find_by_identity(&self, id: Uuid) -> Result<Option<TotpCredential>, IdentityError> {
        let model = totp_credentials::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find totp credential")?;
        Ok(model.map(totp_from_model))
    }

    async fn create_unconfirmed(&self, credential: &TotpCredential) -> Result<(), IdentityError> {
        let credential = credential.clone();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    // Setup replaces a pending secret but never a confirmed one.
                    totp_credentials::Entity::delete_many()
                        .filter(totp_credentials::Column::IdentityId.eq(credential.identity_id))
                        .filter(totp_credentials::Column::ConfirmedAt.is_null())
                        .exec(txn)
                        .await?;
                    totp_credentials::ActiveModel {
                        identity_id: Set(credential.identity_id),
                        secret: Set(credential.secret.clone()),
                        algorithm: Set(credential.algorithm.clone()),
                        digits: Set(credential.digits as i16),
                        step_seconds: Set(credential.step_seconds as i32),
                        confirmed_at: Set(None),
                        last_used_at: Set(None),
                        created_at: Set(credential.created_at),
                    }
                    .insert(txn)
                    .await?;
                    Ok(())
                })
            })
            .await
            .context("create unconfirmed totp credential")?;
        Ok(())
    }

    async fn confirm_and_store_backup_codes(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
        code_hashes: &[String],
    ) -> Result<(), IdentityError> {
        let hashes = code_hashes.to_vec();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    let result = totp_credentials::Entity::update_many()
                        .col_expr(totp_credentials::Column::ConfirmedAt, Expr::value(Some(at)))
                        .filter(totp_credentials::Column::IdentityId.eq(identity_id))
                        .filter(totp_credentials::Column::ConfirmedAt.is_null())
                        .exec(txn)
                        .await?;
                    if result.rows_affected != 1 {
                        return Err(sea_orm::DbErr::RecordNotUpdated);
                    }
                    replace_backup_codes(txn, identity_id, &hashes).await
                })
            })
            .await
            .context("confirm totp credential")?;
        Ok(())
    }

    async fn claim_time_step(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
        step_seconds: u64,
    ) -> Result<bool, IdentityError> {
        let step = step_seconds as i64;
        let step_start = DateTime::from_timestamp(at.timestamp().div_euclid(step) * step, 0)
            .ok_or_else(|| anyhow::anyhow!("totp step start out of range"))?;
        // Conditional write: a row whose last_used_at already falls inside
        // the current step is left alone and the claim fails.
        let result = totp_credentials::Entity::update_many()
            .col_expr(totp_credentials::Column::LastUsedAt, Expr::value(Some(at)))
            .filter(totp_credentials::Column::IdentityId.eq(identity_id))
            .filter(
                Condition::any()
                    .add(totp_credentials::Column::LastUsedAt.is_null())
                    .add(totp_credentials::Column::LastUsedAt.lt(step_start)),
            )
            .exec(&self.db)
            .await
            .context("claim totp time step")?;
        Ok(result.rows_affected == 1)
    }

    async fn disable_with_reauth(
        &self,
        identity_id: Uuid,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError> {
        let jti = reauth_jti.to_owned();
        let disabled = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    if !consume_reauth_row(txn, identity_id, &jti).await? {
                        return Ok(false);
                    }
                    totp_credentials::Entity::delete_many()
                        .filter(totp_credentials::Column::IdentityId.eq(identity_id))
                        .exec(txn)
                        .await?;
                    backup_codes::Entity::delete_many()
                        .filter(backup_codes::Column::IdentityId.eq(identity_id))
                        .exec(txn)
                        .await?;
                    Ok(true)
                })
            })
            .await
            .context("disable totp")?;
        Ok(disabled)
    }
}

// ── Backup code repository ───────────────────────────────────────────────

#[derive(Clone)]
pub struct DbBackupCodeRepository {
    pub db: DatabaseConnection,
}

impl BackupCodeRepository for DbBackupCodeRepository {
    async fn list_unused(&self, identity_id: Uuid) -> Result<Vec<BackupCode>, IdentityError> {
        let models = backup_codes::Entity::find()
            .filter(backup_codes::Column::IdentityId.eq(identity_id))
            .filter(backup_codes::Column::UsedAt.is_null())
            .all(&self.db)
            .await
            .context("list unused backup codes")?;
        Ok(models
            .into_iter()
            .map(|m| BackupCode {
                id: m.id,
                identity_id: m.identity_id,
                code_hash: m.code_hash,
                used_at: m.used_at,
                created_at: m.created_at,
            })
            .collect())
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, IdentityError> {
        let result = backup_codes::Entity::update_many()
            .col_expr(
                backup_codes::Column::UsedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(backup_codes::Column::Id.eq(id))
            .filter(backup_codes::Column::UsedAt.is_null())
            .exec(&self.db)
            .await
            .context("mark backup code used")?;
        Ok(result.rows_affected == 1)
    }

    async fn count_unused(&self, identity_id: Uuid) -> Result<u64, IdentityError> {
        let count = backup_codes::Entity::find()
            .filter(backup_codes::Column::IdentityId.eq(identity_id))
            .filter(backup_codes::Column::UsedAt.is_null())
            .count(&self.db)
            .await
            .context("count unused backup codes")?;
        Ok(count)
    }

    async fn replace_all(
        &self,
        identity_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), IdentityError> {
        let hashes = code_hashes.to_vec();
        self.db
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move { replace_backup_codes(txn, identity_id, &hashes).await })
            })
            .await
            .context("replace backup codes")?;
        Ok(())
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

async fn insert_token(txn: &DatabaseTransaction, token: &OneTimeToken) -> Result<(), sea_orm::DbErr> {
    one_time_tokens::ActiveModel {
        id: Set(token.id),
        identity_id: Set(token.identity_id),
        kind: Set(token.kind.as_str().to_owned()),
        value: Set(token.value.clone()),
        valid_until: Set(token.valid_until),
        created_at: Set(token.created_at),
    }
    .insert(txn)
    .await?;
    Ok(())
}

/// Delete a token by id. `false` means a racing consumer got there first.
async fn delete_token(txn: &DatabaseTransaction, id: Uuid) -> Result<bool, sea_orm::DbErr> {
    let result = one_time_tokens::Entity::delete_by_id(id).exec(txn).await?;
    Ok(result.rows_affected == 1)
}

/// Consume the one-time row backing a reauthorization jti. Expired rows do
/// not count; the signed token would have failed validation first anyway.
async fn consume_reauth_row(
    txn: &DatabaseTransaction,
    identity_id: Uuid,
    jti: &str,
) -> Result<bool, sea_orm::DbErr> {
    let result = one_time_tokens::Entity::delete_many()
        .filter(one_time_tokens::Column::IdentityId.eq(identity_id))
        .filter(one_time_tokens::Column::Kind.eq(OneTimeTokenKind::Reauthorization.as_str()))
        .filter(one_time_tokens::Column::Value.eq(jti))
        .filter(one_time_tokens::Column::ValidUntil.gt(Utc::now()))
        .exec(txn)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn rotate_password(
    txn: &DatabaseTransaction,
    identity_id: Uuid,
    password_hash: &str,
) -> Result<(), sea_orm::DbErr> {
    identities::Entity::update_many()
        .col_expr(
            identities::Column::PasswordHash,
            Expr::value(password_hash.to_owned()),
        )
        .col_expr(
            identities::Column::SessionVersion,
            Expr::col(identities::Column::SessionVersion).add(1),
        )
        .col_expr(identities::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(identities::Column::Id.eq(identity_id))
        .exec(txn)
        .await?;
    Ok(())
}

async fn replace_backup_codes(
    txn: &DatabaseTransaction,
    identity_id: Uuid,
    code_hashes: &[String],
) -> Result<(), sea_orm::DbErr> {
    backup_codes::Entity::delete_many()
        .filter(backup_codes::Column::IdentityId.eq(identity_id))
        .exec(txn)
        .await?;
    if code_hashes.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let models = code_hashes.iter().map(|hash| backup_codes::ActiveModel {
        id: Set(Uuid::new_v4()),
        identity_id: Set(identity_id),
        code_hash: Set(hash.clone()),
        used_at: Set(None),
        created_at: Set(now),
    });
    backup_codes::Entity::insert_many(models).exec(txn).await?;
    Ok(())
}

fn identity_from_model(model: identities::Model) -> Identity {
    Identity {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        email_verified: model.email_verified,
        session_version: model.session_version,
        pending_deletion_at: model.pending_deletion_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn token_from_model(model: one_time_tokens::Model) -> Result<OneTimeToken, IdentityError> {
    let kind = OneTimeTokenKind::from_str(&model.kind)
        .ok_or_else(|| anyhow::anyhow!("unknown one-time token kind {:?}", model.kind))?;
    Ok(OneTimeToken {
        id: model.id,
        identity_id: model.identity_id,
        kind,
        value: model.value,
        valid_until: model.valid_until,
        created_at: model.created_at,
    })
}

fn totp_from_model(model: totp_credentials::Model) -> TotpCredential {
    TotpCredential {
        identity_id: model.identity_id,
        secret: model.secret,
        algorithm: model.algorithm,
        digits: model.digits as u32,
        step_seconds: model.step_seconds as u64,
        confirmed_at: model.confirmed_at,
        last_used_at: model.last_used_at,
        created_at: model.created_at,
    }
}
