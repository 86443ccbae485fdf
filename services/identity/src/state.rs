use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::infra::db::{
    DbBackupCodeRepository, DbEmailChangeRepository, DbIdentityRepository,
    DbOneTimeTokenRepository, DbTotpRepository,
};
use crate::infra::mail::HttpMailer;
use crate::infra::password::ArgonPasswordHasher;
use crate::ratelimit::{RateLimits, SharedRateStore};
use crate::totp::TotpProvisioner;
use crate::usecase::token::TokenSigner;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub signer: TokenSigner,
    pub hasher: ArgonPasswordHasher,
    pub mailer: HttpMailer,
    pub limits: Arc<RateLimits<SharedRateStore>>,
    pub provisioner: TotpProvisioner,
    pub cookie_domain: String,
    pub verification_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
    pub email_change_ttl_secs: u64,
    pub deletion_grace_days: u16,
    pub backup_code_count: u8,
    pub backup_code_length: u8,
}

impl AppState {
    pub fn identity_repo(&self) -> DbIdentityRepository {
        DbIdentityRepository {
            db: self.db.clone(),
        }
    }

    pub fn token_repo(&self) -> DbOneTimeTokenRepository {
        DbOneTimeTokenRepository {
            db: self.db.clone(),
        }
    }

    pub fn email_change_repo(&self) -> DbEmailChangeRepository {
        DbEmailChangeRepository {
            db: self.db.clone(),
        }
    }

    pub fn totp_repo(&self) -> DbTotpRepository {
        DbTotpRepository {
            db: self.db.clone(),
        }
    }

    pub fn backup_code_repo(&self) -> DbBackupCodeRepository {
        DbBackupCodeRepository {
            db: self.db.clone(),
        }
    }
}
