use chrono::{Duration, Utc};

use gatehouse_auth_types::token::ReauthPurpose;

use gatehouse_identity::domain::types::Identity;
use gatehouse_identity::error::IdentityError;
use gatehouse_identity::usecase::deletion::{
    CancelDeletionUseCase, ConfirmDeletionUseCase, RequestDeletionUseCase,
};
use gatehouse_identity::usecase::token::ReauthorizeUseCase;

use crate::helpers::{MockHasher, TEST_PASSWORD, TEST_SECRET, World, test_signer, verified_identity};

const GRACE_DAYS: u16 = 7;

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

#[tokio::test]
async fn should_mark_pending_and_consume_reauthorization() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let reauth = reauth_for(&world, &identity, ReauthPurpose::DeleteAccount).await;
    let usecase = RequestDeletionUseCase {
        identities: world.identity_repo(),
        secret: TEST_SECRET.to_owned(),
    };

    let marked = usecase.execute(&reauth).await.unwrap();
    assert!(marked.pending_deletion_at.is_some());
    assert!(world.identity(identity.id).pending_deletion_at.is_some());

    // The reauthorization was spent; replaying it cannot re-arm deletion.
    assert!(matches!(
        usecase.execute(&reauth).await,
        Err(IdentityError::InvalidToken)
    ));
}

#[tokio::test]
async fn should_reject_wrong_purpose_reauthorization() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let reauth = reauth_for(&world, &identity, ReauthPurpose::ChangeEmail).await;

    let usecase = RequestDeletionUseCase {
        identities: world.identity_repo(),
        secret: TEST_SECRET.to_owned(),
    };
    assert!(matches!(
        usecase.execute(&reauth).await,
        Err(IdentityError::InvalidToken)
    ));
    assert!(world.identity(identity.id).pending_deletion_at.is_none());
}

#[tokio::test]
async fn should_cancel_pending_deletion() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let reauth = reauth_for(&world, &identity, ReauthPurpose::DeleteAccount).await;
    RequestDeletionUseCase {
        identities: world.identity_repo(),
        secret: TEST_SECRET.to_owned(),
    }
    .execute(&reauth)
    .await
    .unwrap();

    let cancel = CancelDeletionUseCase {
        identities: world.identity_repo(),
    };
    cancel.execute(&identity).await.unwrap();
    assert!(world.identity(identity.id).pending_deletion_at.is_none());

    // Nothing left to cancel.
    assert!(matches!(
        cancel.execute(&identity).await,
        Err(IdentityError::DeletionNotPending)
    ));
}

#[tokio::test]
async fn should_refuse_confirm_before_grace_period() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());
    let reauth = reauth_for(&world, &identity, ReauthPurpose::DeleteAccount).await;
    let pending = RequestDeletionUseCase {
        identities: world.identity_repo(),
        secret: TEST_SECRET.to_owned(),
    }
    .execute(&reauth)
    .await
    .unwrap();

    let confirm = ConfirmDeletionUseCase {
        identities: world.identity_repo(),
        grace_days: GRACE_DAYS,
    };
    assert!(matches!(
        confirm.execute(&pending).await,
        Err(IdentityError::GracePeriodNotExpired)
    ));
    // The account survives a premature confirm.
    assert_eq!(world.identities.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_require_pending_mark_for_confirm() {
    let identity = verified_identity("a@example.com");
    let world = World::new().with_identity(identity.clone());

    let confirm = ConfirmDeletionUseCase {
        identities: world.identity_repo(),
        grace_days: GRACE_DAYS,
    };
    assert!(matches!(
        confirm.execute(&identity).await,
        Err(IdentityError::DeletionNotPending)
    ));
}

#[tokio::test]
async fn should_delete_account_and_dependents_after_grace_period() {
    let mut identity = verified_identity("a@example.com");
    identity.pending_deletion_at = Some(Utc::now() - Duration::days(GRACE_DAYS as i64 + 1));
    let world = World::new().with_identity(identity.clone());
    world
        .profiles
        .lock()
        .unwrap()
        .insert(identity.id, Some("Ada".to_owned()));
    // An unrelated account must not be touched by the cascade.
    let bystander = verified_identity("b@example.com");
    world.identities.lock().unwrap().push(bystander.clone());

    ConfirmDeletionUseCase {
        identities: world.identity_repo(),
        grace_days: GRACE_DAYS,
    }
    .execute(&identity)
    .await
    .unwrap();

    let identities = world.identities.lock().unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].id, bystander.id);
    assert!(!world.profiles.lock().unwrap().contains_key(&identity.id));
    assert!(world.tokens.lock().unwrap().is_empty());
}
