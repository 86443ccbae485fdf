use gatehouse_auth_types::token::{
    ReauthPurpose, TokenError, identify_token_kind, TokenKind, validate_access_token,
    validate_refresh_token,
};

use gatehouse_identity::domain::types::OneTimeTokenKind;
use gatehouse_identity::error::IdentityError;
use gatehouse_identity::usecase::token::{
    CheckAccessUseCase, LogoutUseCase, ReauthorizeUseCase, RefreshTokenUseCase,
    verify_reauthorization,
};

use crate::helpers::{MockHasher, TEST_PASSWORD, TEST_SECRET, World, test_signer, verified_identity};

// ── TokenSigner ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_issue_pair_that_validates() {
    let identity = verified_identity("a@example.com");
    let pair = test_signer()
        .issue_pair(&identity, Some("Ada".to_owned()))
        .unwrap();

    let access = validate_access_token(&pair.access_token, TEST_SECRET).unwrap();
    assert_eq!(access.sub, identity.id.to_string());
    assert_eq!(access.email, "a@example.com");
    assert_eq!(access.name.as_deref(), Some("Ada"));
    assert_eq!(access.sv, 0);
    assert_eq!(access.exp, pair.access_token_exp);

    let refresh = validate_refresh_token(&pair.refresh_token, TEST_SECRET).unwrap();
    assert_eq!(refresh.sub, identity.id.to_string());
    assert!(!refresh.jti.is_empty());
}

#[tokio::test]
async fn should_not_validate_access_token_as_refresh() {
    let identity = verified_identity("a@example.com");
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    // Access claims carry no jti, so the structural decode already fails.
    let result = validate_refresh_token(&pair.access_token, TEST_SECRET);
    assert!(matches!(result, Err(TokenError::Malformed)));
    assert_eq!(
        identify_token_kind(&pair.access_token, TEST_SECRET).unwrap(),
        TokenKind::Access
    );
}

#[tokio::test]
async fn should_reject_wrong_secret() {
    let identity = verified_identity("a@example.com");
    let pair = test_signer().issue_pair(&identity, None).unwrap();
    assert!(matches!(
        validate_access_token(&pair.access_token, "other-secret"),
        Err(TokenError::InvalidSignature)
    ));
}

// ── CheckAccess ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_check_access_against_live_session_version() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    let usecase = CheckAccessUseCase {
        identities: world.identity_repo(),
        secret: TEST_SECRET.to_owned(),
    };
    let out = usecase.execute(&pair.access_token).await.unwrap();
    assert_eq!(out.identity_id, identity.id);

    // Logout bumps the version; the same token is now stale.
    world.identities.lock().unwrap()[0].session_version += 1;
    assert!(matches!(
        usecase.execute(&pair.access_token).await,
        Err(IdentityError::SessionStale)
    ));
}

// ── RefreshToken ─────────────────────────────────────────────────────────

#[tokio::test]
async fn should_refresh_into_fresh_pair() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    world
        .profiles
        .lock()
        .unwrap()
        .insert(identity.id, Some("Ada".to_owned()));
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    let usecase = RefreshTokenUseCase {
        identities: world.identity_repo(),
        signer: test_signer(),
    };
    let out = usecase.execute(&pair.refresh_token, None).await.unwrap();
    assert_eq!(out.identity_id, identity.id);

    let access = validate_access_token(&out.pair.access_token, TEST_SECRET).unwrap();
    assert_eq!(access.name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn should_reject_refresh_after_session_version_bump() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    world.identities.lock().unwrap()[0].session_version += 1;

    let usecase = RefreshTokenUseCase {
        identities: world.identity_repo(),
        signer: test_signer(),
    };
    assert!(matches!(
        usecase.execute(&pair.refresh_token, None).await,
        Err(IdentityError::SessionStale)
    ));
}

#[tokio::test]
async fn should_reject_refresh_for_unexpected_identity() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    let usecase = RefreshTokenUseCase {
        identities: world.identity_repo(),
        signer: test_signer(),
    };
    let other = uuid::Uuid::new_v4();
    assert!(matches!(
        usecase.execute(&pair.refresh_token, Some(other)).await,
        Err(IdentityError::IdentityMismatch)
    ));
}

#[tokio::test]
async fn should_reject_refresh_for_deleted_identity() {
    let identity = verified_identity("a@example.com");
    let pair = test_signer().issue_pair(&identity, None).unwrap();
    let world = World::new();

    let usecase = RefreshTokenUseCase {
        identities: world.identity_repo(),
        signer: test_signer(),
    };
    assert!(matches!(
        usecase.execute(&pair.refresh_token, None).await,
        Err(IdentityError::InvalidToken)
    ));
}

// ── Reauthorize ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_mint_consumable_reauthorization() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let usecase = ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    };

    let token = usecase
        .execute(&identity, TEST_PASSWORD, vec![ReauthPurpose::ChangeEmail])
        .await
        .unwrap();

    // The signed token checks out for its purpose and not for others.
    let (loaded, claims) = verify_reauthorization(
        &world.identity_repo(),
        &token,
        ReauthPurpose::ChangeEmail,
        TEST_SECRET,
    )
    .await
    .unwrap();
    assert_eq!(loaded.id, identity.id);
    assert!(matches!(
        verify_reauthorization(
            &world.identity_repo(),
            &token,
            ReauthPurpose::DeleteAccount,
            TEST_SECRET,
        )
        .await,
        Err(IdentityError::InvalidToken)
    ));

    // And its jti is persisted as a one-time row.
    let rows = world.tokens.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, OneTimeTokenKind::Reauthorization);
    assert_eq!(rows[0].value, claims.jti);
}

#[tokio::test]
async fn should_reject_reauthorization_with_wrong_password() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let usecase = ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    };

    assert!(matches!(
        usecase
            .execute(&identity, "wrong password!", vec![ReauthPurpose::DisableMfa])
            .await,
        Err(IdentityError::InvalidCredentials)
    ));
    assert!(world.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_reject_empty_scope() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let usecase = ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    };
    assert!(matches!(
        usecase.execute(&identity, TEST_PASSWORD, vec![]).await,
        Err(IdentityError::Validation(_))
    ));
}

// ── Logout ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_invalidate_all_tokens_on_logout() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let pair = test_signer().issue_pair(&identity, None).unwrap();

    LogoutUseCase {
        identities: world.identity_repo(),
    }
    .execute(identity.id)
    .await
    .unwrap();

    assert_eq!(world.identity(identity.id).session_version, 1);
    let usecase = RefreshTokenUseCase {
        identities: world.identity_repo(),
        signer: test_signer(),
    };
    assert!(matches!(
        usecase.execute(&pair.refresh_token, None).await,
        Err(IdentityError::SessionStale)
    ));
}
