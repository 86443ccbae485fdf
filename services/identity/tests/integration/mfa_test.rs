use chrono::Utc;
use totp_rs::{Algorithm, Secret, TOTP};

use gatehouse_auth_types::token::{MfaMethod, ReauthPurpose, validate_access_token};

use gatehouse_identity::domain::types::{Identity, TotpCredential};
use gatehouse_identity::error::IdentityError;
use gatehouse_identity::usecase::login::{LoginInput, LoginOutcome, LoginUseCase};
use gatehouse_identity::usecase::mfa::{
    BackupCodesRemainingUseCase, ConfirmTotpUseCase, DisableTotpUseCase,
    RegenerateBackupCodesUseCase, SetupTotpUseCase, VerifyMfaUseCase,
};
use gatehouse_identity::usecase::token::ReauthorizeUseCase;

use crate::helpers::{
    MockHasher, TEST_PASSWORD, TEST_SECRET, World, test_provisioner, test_signer,
    verified_identity,
};

const BACKUP_CODE_COUNT: u8 = 8;
const BACKUP_CODE_LENGTH: u8 = 10;

/// Plays the role of the user's authenticator app: derives the current
/// code from the secret stored on the credential.
fn authenticator_code(credential: &TotpCredential) -> String {
    let secret = Secret::Encoded(credential.secret.clone())
        .to_bytes()
        .unwrap();
    TOTP::new(
        Algorithm::SHA1,
        credential.digits as usize,
        1,
        credential.step_seconds,
        secret,
        Some("Gatehouse".to_owned()),
        String::new(),
    )
    .unwrap()
    .generate_current()
    .unwrap()
}

fn stored_credential(world: &World, identity: &Identity) -> TotpCredential {
    world
        .totp
        .lock()
        .unwrap()
        .iter()
        .find(|c| c.identity_id == identity.id)
        .cloned()
        .expect("credential not in world")
}

fn confirm_usecase(world: &World) -> ConfirmTotpUseCase<crate::helpers::MockTotpRepo, MockHasher> {
    ConfirmTotpUseCase {
        totp: world.totp_repo(),
        hasher: MockHasher,
        provisioner: test_provisioner(),
        backup_code_count: BACKUP_CODE_COUNT,
        backup_code_length: BACKUP_CODE_LENGTH,
    }
}

fn verify_usecase(
    world: &World,
) -> VerifyMfaUseCase<
    crate::helpers::MockIdentityRepo,
    crate::helpers::MockTotpRepo,
    crate::helpers::MockBackupCodeRepo,
    MockHasher,
> {
    VerifyMfaUseCase {
        identities: world.identity_repo(),
        totp: world.totp_repo(),
        backup_codes: world.backup_code_repo(),
        hasher: MockHasher,
        provisioner: test_provisioner(),
        signer: test_signer(),
        backup_code_length: BACKUP_CODE_LENGTH,
    }
}

/// Enrol the identity: setup, then confirm with a live code. Returns the
/// plaintext backup codes as handed to the user.
async fn enroll(world: &World, identity: &Identity) -> Vec<String> {
    SetupTotpUseCase {
        totp: world.totp_repo(),
        provisioner: test_provisioner(),
    }
    .execute(identity)
    .await
    .unwrap();
    let code = authenticator_code(&stored_credential(world, identity));
    confirm_usecase(world)
        .execute(identity, &code)
        .await
        .unwrap()
        .backup_codes
}

// ── Setup / Confirm ──────────────────────────────────────────────────────

#[tokio::test]
async fn should_return_pending_secret_on_repeated_setup() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let setup = SetupTotpUseCase {
        totp: world.totp_repo(),
        provisioner: test_provisioner(),
    };

    let first = setup.execute(&identity).await.unwrap();
    assert_eq!(first.secret, stored_credential(&world, &identity).secret);
    assert!(first.otpauth_uri.starts_with("otpauth://totp/"));
    assert!(!stored_credential(&world, &identity).is_confirmed());

    // Setup is idempotent while unconfirmed: a user who already scanned
    // the QR code gets the same secret back, not a replacement.
    let second = setup.execute(&identity).await.unwrap();
    assert_eq!(second.secret, first.secret);
    assert_eq!(second.otpauth_uri, first.otpauth_uri);
    assert_eq!(world.totp.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_not_replace_confirmed_credential() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;

    let result = SetupTotpUseCase {
        totp: world.totp_repo(),
        provisioner: test_provisioner(),
    }
    .execute(&identity)
    .await;
    assert!(matches!(result, Err(IdentityError::MfaAlreadyEnabled)));
}

#[tokio::test]
async fn should_confirm_with_valid_code_and_mint_backup_codes() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    SetupTotpUseCase {
        totp: world.totp_repo(),
        provisioner: test_provisioner(),
    }
    .execute(&identity)
    .await
    .unwrap();

    // A wrong code leaves the credential unconfirmed.
    assert!(matches!(
        confirm_usecase(&world).execute(&identity, "000000").await,
        Err(IdentityError::InvalidCode)
    ));
    assert!(!stored_credential(&world, &identity).is_confirmed());

    let code = authenticator_code(&stored_credential(&world, &identity));
    let out = confirm_usecase(&world).execute(&identity, &code).await.unwrap();

    assert!(stored_credential(&world, &identity).is_confirmed());
    assert_eq!(out.backup_codes.len(), BACKUP_CODE_COUNT as usize);
    // Grouped for display; normalized length underneath.
    for code in &out.backup_codes {
        assert_eq!(code.replace('-', "").len(), BACKUP_CODE_LENGTH as usize);
    }
    assert_eq!(
        world.backup_codes.lock().unwrap().len(),
        BACKUP_CODE_COUNT as usize
    );

    // Enrolment is one-shot.
    assert!(matches!(
        confirm_usecase(&world).execute(&identity, &code).await,
        Err(IdentityError::MfaAlreadyEnabled)
    ));
}

#[tokio::test]
async fn should_reject_confirm_without_setup() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    assert!(matches!(
        confirm_usecase(&world).execute(&identity, "123456").await,
        Err(IdentityError::MfaNotConfigured)
    ));
}

// ── Login challenge ──────────────────────────────────────────────────────

#[tokio::test]
async fn should_require_second_factor_on_login_after_enrolment() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;

    let outcome = LoginUseCase {
        identities: world.identity_repo(),
        totp: world.totp_repo(),
        backup_codes: world.backup_code_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    }
    .execute(LoginInput {
        email: "a@example.com".to_owned(),
        password: TEST_PASSWORD.to_owned(),
    })
    .await
    .unwrap();

    let LoginOutcome::MfaRequired { mfa_token, methods } = outcome else {
        panic!("expected an MFA challenge");
    };
    assert_eq!(methods, vec![MfaMethod::Totp, MfaMethod::BackupCode]);

    // The challenge token completes into a real session.
    let code = authenticator_code(&stored_credential(&world, &identity));
    let pair = verify_usecase(&world).execute(&mfa_token, &code).await.unwrap();
    let access = validate_access_token(&pair.access_token, TEST_SECRET).unwrap();
    assert_eq!(access.sub, identity.id.to_string());
    assert!(stored_credential(&world, &identity).last_used_at.is_some());
}

#[tokio::test]
async fn should_reject_totp_replay_within_same_step() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::Totp], 5)
        .unwrap();

    // A login already used this time step.
    if let Some(c) = world.totp.lock().unwrap().iter_mut().find(|c| c.identity_id == identity.id) {
        c.last_used_at = Some(Utc::now());
    }

    let code = authenticator_code(&stored_credential(&world, &identity));
    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &code).await,
        Err(IdentityError::InvalidCode)
    ));
}

#[tokio::test]
async fn should_reject_totp_when_session_offers_backup_codes_only() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::BackupCode], 5)
        .unwrap();

    // The code itself is valid; the session just never offered TOTP.
    let code = authenticator_code(&stored_credential(&world, &identity));
    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &code).await,
        Err(IdentityError::InvalidCode)
    ));
    assert!(stored_credential(&world, &identity).last_used_at.is_none());
}

#[tokio::test]
async fn should_reject_backup_code_when_session_offers_totp_only() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let codes = enroll(&world, &identity).await;
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::Totp], 5)
        .unwrap();

    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &codes[0]).await,
        Err(IdentityError::InvalidCode)
    ));
    // The code was never spent.
    let remaining = BackupCodesRemainingUseCase {
        backup_codes: world.backup_code_repo(),
    }
    .execute(&identity)
    .await
    .unwrap();
    assert_eq!(remaining, BACKUP_CODE_COUNT as u64);
}

#[tokio::test]
async fn should_spend_backup_code_once() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let codes = enroll(&world, &identity).await;
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::Totp, MfaMethod::BackupCode], 5)
        .unwrap();

    // Lowercased with the display dashes kept, as a user would paste it.
    let pasted = codes[0].to_lowercase();
    verify_usecase(&world).execute(&mfa_token, &pasted).await.unwrap();

    let remaining = BackupCodesRemainingUseCase {
        backup_codes: world.backup_code_repo(),
    }
    .execute(&identity)
    .await
    .unwrap();
    assert_eq!(remaining, BACKUP_CODE_COUNT as u64 - 1);

    // The same code cannot log in twice.
    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &codes[0]).await,
        Err(IdentityError::InvalidCode)
    ));
}

#[tokio::test]
async fn should_reject_stale_mfa_session() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::Totp], 5)
        .unwrap();

    // Logout between challenge and answer.
    world.identities.lock().unwrap()[0].session_version += 1;

    let code = authenticator_code(&stored_credential(&world, &identity));
    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &code).await,
        Err(IdentityError::SessionStale)
    ));
}

// ── Disable / Regenerate ─────────────────────────────────────────────────

#[tokio::test]
async fn should_disable_totp_with_reauthorization() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;
    let reauth = ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    }
    .execute(&identity, TEST_PASSWORD, vec![ReauthPurpose::DisableMfa])
    .await
    .unwrap();

    let disable = DisableTotpUseCase {
        identities: world.identity_repo(),
        totp: world.totp_repo(),
        secret: TEST_SECRET.to_owned(),
    };
    disable.execute(&reauth).await.unwrap();

    // Credential and backup codes are gone together.
    assert!(world.totp.lock().unwrap().is_empty());
    assert!(world.backup_codes.lock().unwrap().is_empty());
    assert!(matches!(
        disable.execute(&reauth).await,
        Err(IdentityError::MfaNotConfigured)
    ));
}

#[tokio::test]
async fn should_reject_disable_with_wrong_purpose() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    enroll(&world, &identity).await;
    let reauth = ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    }
    .execute(&identity, TEST_PASSWORD, vec![ReauthPurpose::ChangePassword])
    .await
    .unwrap();

    let disable = DisableTotpUseCase {
        identities: world.identity_repo(),
        totp: world.totp_repo(),
        secret: TEST_SECRET.to_owned(),
    };
    assert!(matches!(
        disable.execute(&reauth).await,
        Err(IdentityError::InvalidToken)
    ));
    assert!(!world.totp.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_regenerate_backup_codes_and_kill_old_set() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let old_codes = enroll(&world, &identity).await;

    let new_codes = RegenerateBackupCodesUseCase {
        totp: world.totp_repo(),
        backup_codes: world.backup_code_repo(),
        hasher: MockHasher,
        backup_code_count: BACKUP_CODE_COUNT,
        backup_code_length: BACKUP_CODE_LENGTH,
    }
    .execute(&identity)
    .await
    .unwrap();
    assert_eq!(new_codes.len(), BACKUP_CODE_COUNT as usize);

    // An old code no longer logs in; a new one does.
    let mfa_token = test_signer()
        .issue_mfa_session(&identity, vec![MfaMethod::BackupCode], 5)
        .unwrap();
    assert!(matches!(
        verify_usecase(&world).execute(&mfa_token, &old_codes[0]).await,
        Err(IdentityError::InvalidCode)
    ));
    verify_usecase(&world)
        .execute(&mfa_token, &new_codes[0])
        .await
        .unwrap();
}

#[tokio::test]
async fn should_require_enrolment_for_regeneration() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());

    let result = RegenerateBackupCodesUseCase {
        totp: world.totp_repo(),
        backup_codes: world.backup_code_repo(),
        hasher: MockHasher,
        backup_code_count: BACKUP_CODE_COUNT,
        backup_code_length: BACKUP_CODE_LENGTH,
    }
    .execute(&identity)
    .await;
    assert!(matches!(result, Err(IdentityError::MfaNotConfigured)));
}
