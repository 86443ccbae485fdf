use chrono::{Duration, Utc};

use gatehouse_identity::domain::repository::MailKind;
use gatehouse_identity::domain::types::OneTimeTokenKind;
use gatehouse_identity::error::IdentityError;
use gatehouse_identity::usecase::signup::{
    CreateAccountInput, CreateAccountUseCase, VerifyAccountUseCase,
};

use crate::helpers::{MockHasher, MockMailer, TEST_PASSWORD, World, verified_identity};

fn create_usecase(
    world: &World,
    mailer: &MockMailer,
) -> CreateAccountUseCase<crate::helpers::MockIdentityRepo, MockHasher, MockMailer> {
    CreateAccountUseCase {
        identities: world.identity_repo(),
        hasher: MockHasher,
        mailer: mailer.clone(),
        verification_ttl_secs: 86_400,
    }
}

#[tokio::test]
async fn should_create_unverified_account_and_mail_token() {
    let world = World::new();
    let mailer = MockMailer::new();

    let identity = create_usecase(&world, &mailer)
        .execute(CreateAccountInput {
            email: "New.User@Example.com".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await
        .unwrap();

    // Address normalized, account unverified, version at zero.
    assert_eq!(identity.email, "new.user@example.com");
    assert!(!identity.email_verified);
    assert_eq!(identity.session_version, 0);

    assert_eq!(world.token_count(OneTimeTokenKind::EmailVerification), 1);
    let sent = mailer.sent_to("new.user@example.com");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, MailKind::Verification);
}

#[tokio::test]
async fn should_reject_taken_email() {
    let world = World::new().with_identity(verified_identity("taken@example.com"));
    let mailer = MockMailer::new();

    let result = create_usecase(&world, &mailer)
        .execute(CreateAccountInput {
            email: "taken@example.com".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await;
    assert!(matches!(result, Err(IdentityError::EmailInUse)));
    assert!(mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_reject_invalid_input() {
    let world = World::new();
    let mailer = MockMailer::new();
    let usecase = create_usecase(&world, &mailer);

    let bad_email = usecase
        .execute(CreateAccountInput {
            email: "not-an-address".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await;
    assert!(matches!(bad_email, Err(IdentityError::Validation(_))));

    let short_password = usecase
        .execute(CreateAccountInput {
            email: "ok@example.com".to_owned(),
            password: "short".to_owned(),
        })
        .await;
    assert!(matches!(short_password, Err(IdentityError::Validation(_))));
    assert!(world.identities.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_verify_account_exactly_once() {
    let world = World::new();
    let mailer = MockMailer::new();
    let identity = create_usecase(&world, &mailer)
        .execute(CreateAccountInput {
            email: "a@example.com".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await
        .unwrap();
    let token = mailer.last_token(MailKind::Verification).unwrap();

    let verify = VerifyAccountUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
    };
    verify.execute("a@example.com", &token).await.unwrap();

    let stored = world.identity(identity.id);
    assert!(stored.email_verified);
    // Profile provisioned on verification.
    assert!(world.profiles.lock().unwrap().contains_key(&identity.id));

    // The token is consumed; replaying it fails.
    assert!(matches!(
        verify.execute("a@example.com", &token).await,
        Err(IdentityError::NotFound)
    ));
}

#[tokio::test]
async fn should_reject_verification_for_other_address() {
    let world = World::new();
    let mailer = MockMailer::new();
    create_usecase(&world, &mailer)
        .execute(CreateAccountInput {
            email: "a@example.com".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await
        .unwrap();
    let token = mailer.last_token(MailKind::Verification).unwrap();

    let verify = VerifyAccountUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
    };
    assert!(matches!(
        verify.execute("b@example.com", &token).await,
        Err(IdentityError::NotFound)
    ));
}

#[tokio::test]
async fn should_delete_expired_verification_token_on_sight() {
    let world = World::new();
    let mailer = MockMailer::new();
    create_usecase(&world, &mailer)
        .execute(CreateAccountInput {
            email: "a@example.com".to_owned(),
            password: TEST_PASSWORD.to_owned(),
        })
        .await
        .unwrap();
    let token = mailer.last_token(MailKind::Verification).unwrap();
    world.tokens.lock().unwrap()[0].valid_until = Utc::now() - Duration::seconds(1);

    let verify = VerifyAccountUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
    };
    // First observer learns it expired; the row is gone after that.
    assert!(matches!(
        verify.execute("a@example.com", &token).await,
        Err(IdentityError::TokenExpired)
    ));
    assert_eq!(world.token_count(OneTimeTokenKind::EmailVerification), 0);
    assert!(matches!(
        verify.execute("a@example.com", &token).await,
        Err(IdentityError::NotFound)
    ));
}
