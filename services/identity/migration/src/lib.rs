use sea_orm_migration::prelude::*;

mod m20260801_000001_create_identities;
mod m20260801_000002_create_one_time_tokens;
mod m20260801_000003_create_email_change_requests;
mod m20260801_000004_create_totp_credentials;
mod m20260801_000005_create_backup_codes;
mod m20260801_000006_create_user_profiles;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260801_000001_create_identities::Migration),
            Box::new(m20260801_000002_create_one_time_tokens::Migration),
            Box::new(m20260801_000003_create_email_change_requests::Migration),
            Box::new(m20260801_000004_create_totp_credentials::Migration),
            Box::new(m20260801_000005_create_backup_codes::Migration),
            Box::new(m20260801_000006_create_user_profiles::Migration),
        ]
    }
}
