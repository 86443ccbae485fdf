use chrono::{Duration, Utc};

use gatehouse_auth_types::token::ReauthPurpose;

use gatehouse_identity::domain::repository::MailKind;
use gatehouse_identity::domain::types::{Identity, OneTimeTokenKind};
use gatehouse_identity::error::IdentityError;
use gatehouse_identity::usecase::email_change::{
    ConfirmEmailChangeUseCase, RequestEmailChangeInput, RequestEmailChangeUseCase,
};
use gatehouse_identity::usecase::token::ReauthorizeUseCase;

use crate::helpers::{
    MockHasher, MockMailer, TEST_PASSWORD, TEST_SECRET, World, test_signer, verified_identity,
};

async fn reauth_for(world: &World, identity: &Identity, purpose: ReauthPurpose) -> String {
    ReauthorizeUseCase {
        identities: world.identity_repo(),
        tokens: world.token_repo(),
        hasher: MockHasher,
        signer: test_signer(),
    }
    .execute(identity, TEST_PASSWORD, vec![purpose])
    .await
    .unwrap()
}

fn request_usecase(
    world: &World,
    mailer: &MockMailer,
) -> RequestEmailChangeUseCase<
    crate::helpers::MockIdentityRepo,
    crate::helpers::MockEmailChangeRepo,
    MockMailer,
> {
    RequestEmailChangeUseCase {
        identities: world.identity_repo(),
        email_changes: world.email_change_repo(),
        mailer: mailer.clone(),
        secret: TEST_SECRET.to_owned(),
        change_ttl_secs: 3_600,
    }
}

#[tokio::test]
async fn should_mail_both_addresses_on_request() {
    let identity = verified_identity("old@example.com");
    let world = World::new().with_identity(identity.clone());
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;

    request_usecase(&world, &mailer)
        .execute(RequestEmailChangeInput {
            reauthorization_token: reauth,
            new_email: "new@example.com".to_owned(),
        })
        .await
        .unwrap();

    // Confirmation to the new address, notice to the old one.
    let to_new = mailer.sent_to("new@example.com");
    assert_eq!(to_new.len(), 1);
    assert_eq!(to_new[0].1, MailKind::EmailChangeConfirmation);
    let to_old = mailer.sent_to("old@example.com");
    assert_eq!(to_old.len(), 1);
    assert_eq!(to_old[0].1, MailKind::EmailChangeNotice);

    assert_eq!(world.token_count(OneTimeTokenKind::EmailChange), 1);
    assert_eq!(world.email_changes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_consume_reauthorization_on_request() {
    let identity = verified_identity("old@example.com");
    let world = World::new().with_identity(identity.clone());
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;

    request_usecase(&world, &mailer)
        .execute(RequestEmailChangeInput {
            reauthorization_token: reauth.clone(),
            new_email: "new@example.com".to_owned(),
        })
        .await
        .unwrap();

    // The same reauthorization cannot start a second change.
    assert!(matches!(
        request_usecase(&world, &mailer)
            .execute(RequestEmailChangeInput {
                reauthorization_token: reauth,
                new_email: "another@example.com".to_owned(),
            })
            .await,
        Err(IdentityError::InvalidToken)
    ));
}

#[tokio::test]
async fn should_reject_wrong_purpose_reauthorization() {
    let identity = verified_identity("old@example.com");
    let world = World::new().with_identity(identity.clone());
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangePassword).await;

    assert!(matches!(
        request_usecase(&world, &mailer)
            .execute(RequestEmailChangeInput {
                reauthorization_token: reauth,
                new_email: "new@example.com".to_owned(),
            })
            .await,
        Err(IdentityError::InvalidToken)
    ));
}

#[tokio::test]
async fn should_reject_taken_target_address() {
    let identity = verified_identity("old@example.com");
    let world = World::new()
        .with_identity(identity.clone())
        .with_identity(verified_identity("taken@example.com"));
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;

    assert!(matches!(
        request_usecase(&world, &mailer)
            .execute(RequestEmailChangeInput {
                reauthorization_token: reauth,
                new_email: "taken@example.com".to_owned(),
            })
            .await,
        Err(IdentityError::EmailInUse)
    ));
}

#[tokio::test]
async fn should_apply_change_exactly_once() {
    let identity = verified_identity("old@example.com");
    let world = World::new().with_identity(identity.clone());
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;
    request_usecase(&world, &mailer)
        .execute(RequestEmailChangeInput {
            reauthorization_token: reauth,
            new_email: "new@example.com".to_owned(),
        })
        .await
        .unwrap();
    let token = mailer.last_token(MailKind::EmailChangeConfirmation).unwrap();

    let confirm = ConfirmEmailChangeUseCase {
        identities: world.identity_repo(),
        email_changes: world.email_change_repo(),
        mailer: mailer.clone(),
    };
    confirm.execute(&token).await.unwrap();

    let stored = world.identity(identity.id);
    assert_eq!(stored.email, "new@example.com");
    assert!(stored.email_verified);
    // Tokens minted for the old address die with the version bump.
    assert_eq!(stored.session_version, 1);

    // Success notice lands where the account now lives; the old address
    // gets a goodbye heads-up.
    let to_new = mailer.sent_to("new@example.com");
    assert_eq!(to_new.last().unwrap().1, MailKind::EmailChanged);
    let to_old = mailer.sent_to("old@example.com");
    assert_eq!(to_old.last().unwrap().1, MailKind::EmailChanged);

    // A concurrent confirm that lost the race gets nothing.
    assert!(matches!(
        confirm.execute(&token).await,
        Err(IdentityError::NotFound)
    ));
    assert_eq!(world.identity(identity.id).session_version, 1);
}

#[tokio::test]
async fn should_drop_expired_change_request() {
    let identity = verified_identity("old@example.com");
    let world = World::new().with_identity(identity.clone());
    let mailer = MockMailer::new();
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;
    request_usecase(&world, &mailer)
        .execute(RequestEmailChangeInput {
            reauthorization_token: reauth,
            new_email: "new@example.com".to_owned(),
        })
        .await
        .unwrap();
    let token = mailer.last_token(MailKind::EmailChangeConfirmation).unwrap();
    for t in world.tokens.lock().unwrap().iter_mut() {
        if t.kind == OneTimeTokenKind::EmailChange {
            t.valid_until = Utc::now() - Duration::seconds(1);
        }
    }

    let confirm = ConfirmEmailChangeUseCase {
        identities: world.identity_repo(),
        email_changes: world.email_change_repo(),
        mailer: mailer.clone(),
    };
    assert!(matches!(
        confirm.execute(&token).await,
        Err(IdentityError::TokenExpired)
    ));
    // Request and token were cleaned up together.
    assert!(world.email_changes.lock().unwrap().is_empty());
    assert_eq!(world.token_count(OneTimeTokenKind::EmailChange), 0);
    assert_eq!(world.identity(identity.id).email, "old@example.com");
}
