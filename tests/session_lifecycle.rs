use std::sync::Arc;

use auth_session::{
    config::Config,
    dto::auth::{LoginRequest, RegisterRequest},
    errors::AppError,
    ledger::{MemoryLedger, RefreshTokenLedger},
    models::refresh_token::RefreshTokenRecord,
    password::Argon2Hasher,
    principal::MemoryPrincipalStore,
    services::auth_service::SessionGateway,
    state::AppState,
};
use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

struct Harness {
    gateway: SessionGateway,
    ledger: Arc<MemoryLedger>,
    users: Arc<MemoryPrincipalStore>,
}

fn harness() -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let users = Arc::new(MemoryPrincipalStore::new());
    let state = AppState::from_parts(
        Config::with_secrets("test-access-secret", "test-refresh-secret"),
        users.clone(),
        Arc::new(Argon2Hasher::new()),
        ledger.clone(),
    );
    Harness {
        gateway: state.gateway,
        ledger,
        users,
    }
}

fn register_req(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        password: "hunter2hunter2".into(),
    }
}

fn login_req(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.into(),
        password: password.into(),
    }
}

async fn family(ledger: &MemoryLedger, family_id: Uuid) -> Vec<RefreshTokenRecord> {
    ledger.list_family(family_id).await.unwrap()
}

fn active_count(records: &[RefreshTokenRecord]) -> usize {
    let now = Utc::now();
    records.iter().filter(|r| r.is_active_at(now)).count()
}

#[tokio::test]
async fn login_refresh_refresh_logout_leaves_a_dead_chain_of_three() {
    let h = harness();
    h.gateway.register(register_req("frank")).await.unwrap();

    let start = h
        .gateway
        .login(login_req("frank", "hunter2hunter2"))
        .await
        .unwrap();
    let family_id = start.tokens.record.family_id;

    let second = h.gateway.refresh(&start.tokens.refresh_token).await.unwrap();
    assert_eq!(active_count(&family(&h.ledger, family_id).await), 1);

    let third = h.gateway.refresh(&second.refresh_token).await.unwrap();
    assert_eq!(active_count(&family(&h.ledger, family_id).await), 1);

    assert!(h.gateway.logout(&third.refresh_token).await.unwrap());

    let chain = family(&h.ledger, family_id).await;
    assert_eq!(chain.len(), 3);
    assert!(chain.iter().all(|r| r.is_revoked()));
    assert_eq!(chain[0].replaced_by, Some(chain[1].id));
    assert_eq!(chain[1].replaced_by, Some(chain[2].id));
    assert_eq!(chain[2].replaced_by, None);
    assert_eq!(active_count(&chain), 0);
}

#[tokio::test]
async fn replaying_the_original_token_compromises_the_family() {
    let h = harness();
    let start = h.gateway.register(register_req("grace")).await.unwrap();
    let family_id = start.tokens.record.family_id;

    let rotated = h.gateway.refresh(&start.tokens.refresh_token).await.unwrap();

    assert!(matches!(
        h.gateway.refresh(&start.tokens.refresh_token).await,
        Err(AppError::SessionCompromised)
    ));
    assert_eq!(active_count(&family(&h.ledger, family_id).await), 0);

    // The legitimately rotated token died with the family.
    assert!(matches!(
        h.gateway.refresh(&rotated.refresh_token).await,
        Err(AppError::SessionCompromised)
    ));
}

#[tokio::test]
async fn reuse_signs_the_user_out_everywhere_but_spares_other_users() {
    let h = harness();
    let laptop = h.gateway.register(register_req("heidi")).await.unwrap();
    let phone = h
        .gateway
        .login(login_req("heidi", "hunter2hunter2"))
        .await
        .unwrap();
    let other = h.gateway.register(register_req("ivan")).await.unwrap();

    h.gateway.refresh(&laptop.tokens.refresh_token).await.unwrap();
    assert!(h.gateway.refresh(&laptop.tokens.refresh_token).await.is_err());

    assert!(matches!(
        h.gateway.refresh(&phone.tokens.refresh_token).await,
        Err(AppError::SessionCompromised)
    ));
    assert!(h.gateway.refresh(&other.tokens.refresh_token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotation_of_one_token_has_a_single_winner() {
    const N: usize = 16;

    let h = harness();
    let start = h.gateway.register(register_req("judy")).await.unwrap();
    let family_id = start.tokens.record.family_id;
    let raw = Arc::new(start.tokens.refresh_token);

    let mut tasks = JoinSet::new();
    for _ in 0..N {
        let gateway = h.gateway.clone();
        let raw = raw.clone();
        tasks.spawn(async move { gateway.refresh(&raw).await });
    }

    let mut won = 0;
    let mut compromised = 0;
    while let Some(outcome) = tasks.join_next().await {
        match outcome.unwrap() {
            Ok(_) => won += 1,
            Err(AppError::SessionCompromised) => compromised += 1,
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(compromised, N - 1);

    // One successor was created, then the losers' cascade revoked it.
    let chain = family(&h.ledger, family_id).await;
    assert_eq!(chain.len(), 2);
    assert_eq!(active_count(&chain), 0);
}

#[tokio::test]
async fn at_most_one_active_member_per_family() {
    let h = harness();
    let start = h.gateway.register(register_req("mallory")).await.unwrap();
    let family_id = start.tokens.record.family_id;

    let mut raw = start.tokens.refresh_token;
    for _ in 0..5 {
        raw = h.gateway.refresh(&raw).await.unwrap().refresh_token;
        assert_eq!(active_count(&family(&h.ledger, family_id).await), 1);
    }
}

#[tokio::test]
async fn logout_is_idempotent_and_narrow() {
    let h = harness();
    let first = h.gateway.register(register_req("niaj")).await.unwrap();
    let second = h
        .gateway
        .login(login_req("niaj", "hunter2hunter2"))
        .await
        .unwrap();

    assert!(h.gateway.logout(&first.tokens.refresh_token).await.unwrap());
    assert!(!h.gateway.logout(&first.tokens.refresh_token).await.unwrap());
    assert!(!h.gateway.logout("never-issued-token-value").await.unwrap());

    // The other session is untouched by logout.
    assert!(h.gateway.refresh(&second.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn credentials_never_reveal_which_check_failed() {
    let h = harness();
    let user = h.gateway.register(register_req("olivia")).await.unwrap().user;

    assert!(matches!(
        h.gateway.login(login_req("nobody", "hunter2hunter2")).await,
        Err(AppError::InvalidCredentials)
    ));
    assert!(matches!(
        h.gateway.login(login_req("olivia", "wrong-password")).await,
        Err(AppError::InvalidCredentials)
    ));

    h.users.set_active(user.id, false);
    assert!(matches!(
        h.gateway.login(login_req("olivia", "wrong-password")).await,
        Err(AppError::InvalidCredentials)
    ));
    assert!(matches!(
        h.gateway.login(login_req("olivia", "hunter2hunter2")).await,
        Err(AppError::AccountDisabled)
    ));
}

#[tokio::test]
async fn disabled_owner_cannot_refresh() {
    let h = harness();
    let start = h.gateway.register(register_req("peggy")).await.unwrap();
    h.users.set_active(start.user.id, false);

    assert!(matches!(
        h.gateway.refresh(&start.tokens.refresh_token).await,
        Err(AppError::AccountDisabled)
    ));
    assert_eq!(
        active_count(&family(&h.ledger, start.tokens.record.family_id).await),
        0
    );
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = harness();
    h.gateway.register(register_req("rupert")).await.unwrap();
    assert!(matches!(
        h.gateway.register(register_req("rupert")).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        h.gateway
            .register(RegisterRequest {
                username: "ab".into(),
                password: "hunter2hunter2".into(),
            })
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn current_principal_accepts_only_access_tokens() {
    let h = harness();
    let start = h.gateway.register(register_req("sybil")).await.unwrap();

    let subject = h
        .gateway
        .current_principal(&start.tokens.access_token)
        .unwrap();
    assert_eq!(subject.id, start.user.id);
    assert_eq!(subject.username, "sybil");
    assert!(!subject.is_admin);

    assert!(matches!(
        h.gateway.current_principal(&start.tokens.refresh_token),
        Err(AppError::Unauthorized)
    ));
    assert!(matches!(
        h.gateway.current_principal("garbage"),
        Err(AppError::Malformed)
    ));
}

#[tokio::test]
async fn disabling_an_account_revokes_its_sessions() {
    let h = harness();
    let laptop = h.gateway.register(register_req("trent")).await.unwrap();
    let phone = h
        .gateway
        .login(login_req("trent", "hunter2hunter2"))
        .await
        .unwrap();

    assert!(!h.gateway.toggle_active(laptop.user.id).await.unwrap());
    for start in [&laptop, &phone] {
        assert_eq!(
            active_count(&family(&h.ledger, start.tokens.record.family_id).await),
            0
        );
    }
    assert!(matches!(
        h.gateway.login(login_req("trent", "hunter2hunter2")).await,
        Err(AppError::AccountDisabled)
    ));

    assert!(h.gateway.toggle_active(laptop.user.id).await.unwrap());
    assert!(h
        .gateway
        .login(login_req("trent", "hunter2hunter2"))
        .await
        .is_ok());
    assert!(matches!(
        h.gateway.toggle_active(Uuid::new_v4()).await,
        Err(AppError::NotFound)
    ));
}
