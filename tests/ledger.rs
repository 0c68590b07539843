use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vod_portal::access::{self, Access, ContentRef};
use vod_portal::auth;
use vod_portal::config::Config;
use vod_portal::datasource::repository::films::FilmRecord;
use vod_portal::datasource::repository::seasons::SeasonRecord;
use vod_portal::datasource::repository::{
    episodes, films, seasons, series, tokens, transactions, users,
};
use vod_portal::errors::Error;
use vod_portal::ledger::{self, ClientBundle, PurchaseRequest};
use vod_portal::models::{ContentUnit, Film, Role, Season, TransactionStatus, User};

async fn admin(pool: &PgPool) -> User {
    users::insert(
        pool,
        &users::NewUser {
            external_id: None,
            login_id: "root",
            display_name: None,
            password_hash: None,
            role: Role::Admin,
        },
    )
    .await
    .unwrap()
}

async fn film(pool: &PgPool, title: &str, price: i64) -> Film {
    films::insert(
        pool,
        &FilmRecord {
            title,
            year: 2001,
            description: "a film",
            price,
            genre: "drama",
            thumbnail: None,
            media_file: "film.mp4",
        },
    )
    .await
    .unwrap()
}

async fn season(pool: &PgPool, price: i64) -> Season {
    let series = series::insert(pool, "Dark", "a series", None).await.unwrap();
    seasons::insert(
        pool,
        series.id,
        &SeasonRecord {
            season_number: 1,
            year: 2017,
            description: None,
            price,
        },
    )
    .await
    .unwrap()
}

fn purchase(film_id: Uuid) -> PurchaseRequest {
    PurchaseRequest {
        user_id: "tg-1001".into(),
        amount: 5,
        payment_method: "orange_money".into(),
        film_id: Some(film_id),
        series_id: None,
        season_id: None,
        description: None,
        payment_screenshot: None,
    }
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_confirming_a_film_purchase_grants_access(pool: PgPool) {
    let config = Config::default();
    let admin = admin(&pool).await;
    let film = film(&pool, "Heat", 5).await;

    let pending = ledger::create_pending(&pool, &purchase(film.id)).await.unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);
    assert_eq!(
        access::authorize(&pool, pending.user_id, ContentRef::Film(film.id))
            .await
            .unwrap(),
        Access::Deny
    );

    let confirmed = ledger::confirm(&pool, &config, pending.id, admin.id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, TransactionStatus::Confirmed);
    assert_eq!(confirmed.confirmed_by, Some(admin.id));
    assert!(confirmed.confirmed_at.is_some());

    let user_tokens = tokens::list_for_user(&pool, pending.user_id).await.unwrap();
    assert_eq!(user_tokens.len(), 1);
    assert_eq!(confirmed.access_token_id, Some(user_tokens[0].id));
    assert_eq!(user_tokens[0].total_amount, 5);
    let purchases = tokens::purchases_for_token(&pool, user_tokens[0].id)
        .await
        .unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].content, ContentUnit::Film { film_id: film.id });

    assert_eq!(
        access::authorize(&pool, pending.user_id, ContentRef::Film(film.id))
            .await
            .unwrap(),
        Access::Grant
    );
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_second_transition_conflicts_and_changes_nothing(pool: PgPool) {
    let config = Config::default();
    let admin = admin(&pool).await;
    let film = film(&pool, "Heat", 5).await;
    let pending = ledger::create_pending(&pool, &purchase(film.id)).await.unwrap();

    let rejected = ledger::reject(&pool, &config, pending.id, admin.id)
        .await
        .unwrap();
    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(rejected.access_token_id, None);

    let again = ledger::confirm(&pool, &config, pending.id, admin.id).await;
    assert!(matches!(again, Err(Error::Conflict(_))));

    let stored = transactions::get(&pool, pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Rejected);
    assert_eq!(stored.confirmed_at, rejected.confirmed_at);
    assert!(tokens::list_for_user(&pool, pending.user_id)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_unseen_external_id_creates_a_client(pool: PgPool) {
    let film = film(&pool, "Heat", 5).await;
    let first = ledger::create_pending(&pool, &purchase(film.id)).await.unwrap();
    let second = ledger::create_pending(&pool, &purchase(film.id)).await.unwrap();
    assert_eq!(first.user_id, second.user_id);

    let user = users::find_by_external_id(&pool, "tg-1001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.login_id, "user_tg-1001");
    assert_eq!(user.role, Role::Client);
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_numeric_external_id_records_a_pending_transaction(pool: PgPool) {
    let film = film(&pool, "Heat", 5000).await;
    let request: PurchaseRequest = serde_json::from_value(serde_json::json!({
        "user_id": 123_456_789,
        "amount": 5000.0,
        "payment_method": "wave",
        "film_id": film.id,
    }))
    .unwrap();

    let pending = ledger::create_pending(&pool, &request).await.unwrap();
    assert_eq!(pending.amount, 5000);
    assert_eq!(pending.status, TransactionStatus::Pending);
    let user = users::find_by_external_id(&pool, "123456789")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.id, pending.user_id);
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_expired_token_authorizes_nothing(pool: PgPool) {
    let film = film(&pool, "Heat", 5).await;
    let client = users::insert(
        &pool,
        &users::NewUser {
            external_id: None,
            login_id: "late",
            display_name: None,
            password_hash: None,
            role: Role::Client,
        },
    )
    .await
    .unwrap();
    let expired = Utc::now() - Duration::minutes(1);
    let token = tokens::insert(&pool, client.id, "expired-token", 5, Some(&expired))
        .await
        .unwrap();
    tokens::insert_purchase(&pool, token.id, ContentUnit::Film { film_id: film.id })
        .await
        .unwrap();

    assert_eq!(
        access::authorize(&pool, client.id, ContentRef::Film(film.id))
            .await
            .unwrap(),
        Access::Deny
    );
    assert!(matches!(
        access::library(&pool, client.id).await,
        Err(Error::AccessDenied)
    ));
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_season_purchase_covers_its_episodes(pool: PgPool) {
    let config = Config::default();
    let admin = admin(&pool).await;
    let season = season(&pool, 10).await;
    let episode = episodes::insert(&pool, season.id, 1, "Secrets", "ep1.mp4")
        .await
        .unwrap();
    let request = PurchaseRequest {
        film_id: None,
        series_id: Some(season.series_id),
        season_id: Some(season.id),
        amount: 10,
        ..purchase(Uuid::nil())
    };
    let pending = ledger::create_pending(&pool, &request).await.unwrap();
    ledger::confirm(&pool, &config, pending.id, admin.id)
        .await
        .unwrap();

    assert_eq!(
        access::authorize(&pool, pending.user_id, ContentRef::Episode(episode.id))
            .await
            .unwrap(),
        Access::Grant
    );
    let library = access::library(&pool, pending.user_id).await.unwrap();
    assert_eq!(library.series.len(), 1);
    assert_eq!(library.series[0].seasons[0].episodes.len(), 1);
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_client_bundle_totals_and_lines(pool: PgPool) {
    let config = Config::default();
    let admin = admin(&pool).await;
    let a = film(&pool, "A", 5).await;
    let b = film(&pool, "B", 7).await;
    let season = season(&pool, 10).await;

    let bundle = ClientBundle {
        login_id: "amina".into(),
        password: "a long password".into(),
        display_name: Some("Amina".into()),
        film_ids: vec![a.id, b.id, a.id],
        season_ids: vec![season.id],
        duration_days: None,
        payment_method: None,
        description: None,
    };
    let account = ledger::create_client_account(&pool, &config, admin.id, &bundle)
        .await
        .unwrap();

    assert_eq!(account.transaction.amount, 22);
    assert_eq!(account.transaction.status, TransactionStatus::Confirmed);
    assert_eq!(account.transaction.payment_method, "admin_creation");
    assert_eq!(account.token.total_amount, 22);
    assert_eq!(account.purchases.len(), 3);
    assert_eq!(
        tokens::purchases_for_token(&pool, account.token.id)
            .await
            .unwrap()
            .len(),
        3
    );

    let user = auth::authenticate(&pool, "amina", "a long password", Role::Client)
        .await
        .unwrap();
    assert_eq!(user.id, account.user.id);
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_client_bundle_rolls_back_on_unknown_season(pool: PgPool) {
    let config = Config::default();
    let admin = admin(&pool).await;
    let a = film(&pool, "A", 5).await;

    let bundle = ClientBundle {
        login_id: "ghost".into(),
        password: "a long password".into(),
        display_name: None,
        film_ids: vec![a.id],
        season_ids: vec![Uuid::new_v4()],
        duration_days: Some(7),
        payment_method: None,
        description: None,
    };
    let result = ledger::create_client_account(&pool, &config, admin.id, &bundle).await;
    assert!(matches!(result, Err(Error::NotFound("season"))));
    assert!(users::find_by_login(&pool, "ghost", Role::Client)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_password_reset_is_single_use(pool: PgPool) {
    let config = Config {
        default_admin_password: Some("initial password".into()),
        ..Config::default()
    };
    auth::ensure_default_admin(&pool, &config).await.unwrap();

    let token = auth::request_password_reset(&pool, &config, "admin")
        .await
        .unwrap()
        .unwrap();
    assert!(auth::request_password_reset(&pool, &config, "nobody")
        .await
        .unwrap()
        .is_none());

    auth::reset_password(&pool, &token, "brand new secret", "brand new secret")
        .await
        .unwrap();
    let reused = auth::reset_password(&pool, &token, "another secret", "another secret").await;
    assert!(matches!(reused, Err(Error::Validation(_))));

    assert!(
        auth::authenticate(&pool, "admin", "brand new secret", Role::Admin)
            .await
            .is_ok()
    );
    assert!(matches!(
        auth::authenticate(&pool, "admin", "initial password", Role::Admin).await,
        Err(Error::InvalidCredentials)
    ));
}

#[sqlx::test]
#[ignore = "requires a postgres database"]
async fn test_unknown_logins_take_as_long_as_wrong_passwords(pool: PgPool) {
    let config = Config {
        default_admin_password: Some("initial password".into()),
        ..Config::default()
    };
    auth::ensure_default_admin(&pool, &config).await.unwrap();

    let mut elapsed = Vec::new();
    for login in ["admin", "nobody"] {
        let started = std::time::Instant::now();
        for _ in 0..3 {
            let result = auth::authenticate(&pool, login, "wrong password", Role::Admin).await;
            assert!(matches!(result, Err(Error::InvalidCredentials)));
        }
        elapsed.push(started.elapsed());
    }
    let (known, unknown) = (elapsed[0], elapsed[1]);
    assert!(unknown * 4 > known, "{unknown:?} vs {known:?}");
}
