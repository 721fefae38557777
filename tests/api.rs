mod common;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use chrono::{TimeDelta, Utc};
use common::*;
use meli_sync::api::session;
use meli_sync::error::SyncError;
use meli_sync::notifications;
use meli_sync::store::{NotificationRepository, TokenStore, UserRepository};

// ============================================================================
// Health and home
// ============================================================================

#[tokio::test]
async fn test_status() {
    let app = TestApp::new(MockGateways::default());
    let resp = app.get("/status", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["status"], "ok");
    assert_eq!(resp.body["service"], "meli-sync");
}

#[tokio::test]
async fn test_home_anonymous() {
    let app = TestApp::new(MockGateways::default());
    let resp = app.get("/", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["authenticated"], false);
    assert_eq!(resp.body["data"]["login_url"], "/auth/meli/login");
}

#[tokio::test]
async fn test_home_with_session() {
    let app = TestApp::new(MockGateways::default());
    app.seed_seller(&fresh_token()).await;

    let cookie = app.session_cookie(SELLER_ID);
    let resp = app.get("/", Some(&cookie)).await;

    assert_eq!(resp.body["data"]["authenticated"], true);
    assert_eq!(resp.body["data"]["user"]["user"]["username"], "SELLER_TEST");
}

// ============================================================================
// OAuth flow
// ============================================================================

#[tokio::test]
async fn test_login_redirects_with_signed_state() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_authorization_url()
        .once()
        .returning(|state| format!("https://auth.example.com/authorization?state={state}"));
    let app = TestApp::new(mocks);

    let resp = app.get("/auth/meli/login", None).await;
    assert_eq!(resp.status, StatusCode::TEMPORARY_REDIRECT);

    let location = resp.location().unwrap();
    let state = location.split("state=").nth(1).unwrap();

    let state_cookie = resp.set_cookie().unwrap();
    assert!(state_cookie.starts_with("meli_oauth_state="));
    assert!(state_cookie.contains("HttpOnly"));

    let mut headers = HeaderMap::new();
    let pair = state_cookie.split(';').next().unwrap();
    headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
    assert!(session::verify_login_state(&app.state.crypto, state, &headers, Utc::now()).is_ok());
}

#[tokio::test]
async fn test_callback_with_provider_error() {
    let app = TestApp::new(MockGateways::default());
    let resp = app
        .get("/auth/meli/callback?error=access_denied", None)
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.body["error"]["message"],
        "Authorization failed: access_denied"
    );
}

#[tokio::test]
async fn test_callback_without_code() {
    let app = TestApp::new(MockGateways::default());
    let resp = app.get("/auth/meli/callback", None).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"]["message"], "No authorization code received");
}

#[tokio::test]
async fn test_callback_with_forged_state() {
    let app = TestApp::new(MockGateways::default());
    let resp = app
        .get("/auth/meli/callback?code=TG-abc&state=forged", None)
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_code(), Some("invalid_state"));
}

#[tokio::test]
async fn test_callback_without_state() {
    let app = TestApp::new(MockGateways::default());
    let resp = app.get("/auth/meli/callback?code=TG-abc", None).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_code(), Some("invalid_state"));
}

#[tokio::test]
async fn test_callback_with_stale_state() {
    let app = TestApp::new(MockGateways::default());
    let nonce = session::new_state_nonce();
    let stale = session::sign_login_state(
        &app.state.crypto,
        &nonce,
        Utc::now() - TimeDelta::minutes(11),
    )
    .unwrap();

    let cookie = format!("{}={nonce}", session::STATE_COOKIE);
    let resp = app
        .get(
            &format!("/auth/meli/callback?code=TG-abc&state={stale}"),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"]["message"], "OAuth session expired");
}

#[tokio::test]
async fn test_callback_with_state_from_another_browser() {
    let mut mocks = MockGateways::default();
    mocks.oauth.expect_exchange_code().never();
    let app = TestApp::new(mocks);

    // The attacker's own login state, replayed into the victim's browser.
    let (state, _attacker_cookie) = app.login_state();
    let (_, victim_cookie) = app.login_state();

    let uri = format!("/auth/meli/callback?code=TG-attacker&state={state}");
    for cookie in [Some(victim_cookie.as_str()), None] {
        let resp = app.get(&uri, cookie).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error_code(), Some("invalid_state"));
    }
    assert_eq!(app.store.token_count().await, 0);
}

#[tokio::test]
async fn test_callback_registers_new_seller_and_syncs() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_exchange_code()
        .once()
        .withf(|code, redirect| code == "TG-abc" && redirect == "http://localhost/auth/meli/callback")
        .returning(|_, _| Ok(fresh_token()));
    mocks
        .users
        .expect_get_user_info()
        .once()
        .returning(|_| Ok(user_info()));
    mocks
        .questions
        .expect_get_questions()
        .once()
        .returning(|_| Ok(vec![question(1, "UNANSWERED"), question(2, "ANSWERED")]));
    mocks
        .orders
        .expect_get_orders()
        .once()
        .returning(|_| Ok(vec![order(10, "paid")]));
    let app = TestApp::new(mocks);

    let resp = app.callback("TG-abc").await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some(LANDING_URL));
    let cookies = resp.set_cookies();
    assert_eq!(cookies.len(), 2);
    let cookie = cookies[0];
    assert!(cookie.starts_with("meli_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookies[1].starts_with("meli_oauth_state=;"));
    assert!(cookies[1].contains("Max-Age=0"));

    let user = UserRepository::get(app.store.as_ref(), SELLER_ID)
        .await
        .unwrap()
        .expect("seller should be registered");
    assert_eq!(user.user.username, "SELLER_TEST");
    let stored = TokenStore::get(app.store.as_ref(), SELLER_ID)
        .await
        .unwrap()
        .expect("token should be saved");
    assert_eq!(stored.access_token, "APP_USR-access");
    assert_eq!(app.store.question_count().await, 2);
    assert_eq!(app.store.order_count().await, 1);

    // The issued cookie opens a session.
    let session_cookie = cookie.split(';').next().unwrap();
    let home = app.get("/", Some(session_cookie)).await;
    assert_eq!(home.body["data"]["authenticated"], true);
}

#[tokio::test]
async fn test_callback_for_known_seller_only_saves_token() {
    let mut mocks = MockGateways::default();
    let renewed = token("APP_USR-second", "TG-second", Utc::now() + TimeDelta::hours(6));
    let returned = renewed.clone();
    mocks
        .oauth
        .expect_exchange_code()
        .once()
        .returning(move |_, _| Ok(returned.clone()));
    mocks.users.expect_get_user_info().never();
    mocks.questions.expect_get_questions().never();
    mocks.orders.expect_get_orders().never();
    let app = TestApp::new(mocks);
    app.seed_seller(&fresh_token()).await;

    let resp = app.callback("TG-again").await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(
        TokenStore::get(app.store.as_ref(), SELLER_ID).await.unwrap(),
        Some(renewed)
    );
}

#[tokio::test]
async fn test_initial_sync_failure_does_not_abort_login() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_exchange_code()
        .returning(|_, _| Ok(fresh_token()));
    mocks
        .users
        .expect_get_user_info()
        .returning(|_| Ok(user_info()));
    mocks
        .questions
        .expect_get_questions()
        .returning(|_| Err(SyncError::api(500, "internal")));
    mocks
        .orders
        .expect_get_orders()
        .returning(|_| Err(SyncError::Provider("timeout".into())));
    let app = TestApp::new(mocks);

    let resp = app.callback("TG-abc").await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert!(resp.set_cookie().is_some());
    assert_eq!(app.store.question_count().await, 0);
}

#[tokio::test]
async fn test_callback_with_rejected_code() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_exchange_code()
        .returning(|_, _| Err(SyncError::AuthExchange("invalid_grant".into())));
    let app = TestApp::new(mocks);

    let resp = app.callback("TG-used").await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert_eq!(resp.error_code(), Some("auth_exchange_failed"));
    assert!(resp.body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("re-authorize"));
    assert!(resp.set_cookie().is_none());
}

#[tokio::test]
async fn test_callback_rejects_profile_of_another_account() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_exchange_code()
        .returning(|_, _| Ok(fresh_token()));
    mocks.users.expect_get_user_info().returning(|_| {
        let mut info = user_info();
        info.id = 42;
        Ok(info)
    });
    let app = TestApp::new(mocks);

    let resp = app.callback("TG-abc").await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.store.token_count().await, 0);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = TestApp::new(MockGateways::default());
    let resp = app.get("/auth/logout", None).await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/"));
    assert!(resp.set_cookie().unwrap().contains("Max-Age=0"));
}

// ============================================================================
// Sync endpoints
// ============================================================================

#[tokio::test]
async fn test_protected_endpoints_require_session() {
    let app = TestApp::new(MockGateways::default());

    for uri in ["/questions", "/orders", "/notifications"] {
        let resp = app.get(uri, None).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    let resp = app.post("/questions/sync", Some("meli_session=tampered")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_questions_and_list() {
    let mut mocks = MockGateways::default();
    mocks
        .questions
        .expect_get_questions()
        .times(2)
        .returning(|_| Ok(vec![question(1, "UNANSWERED"), question(2, "ANSWERED")]));
    let app = TestApp::new(mocks);
    app.seed_seller(&fresh_token()).await;
    let cookie = app.session_cookie(SELLER_ID);

    let first = app.post("/questions/sync", Some(&cookie)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["data"]["upserted"], 2);
    assert_eq!(first.body["data"]["created"], 2);

    let second = app.post("/questions/sync", Some(&cookie)).await;
    assert_eq!(second.body["data"]["upserted"], 2);
    assert_eq!(second.body["data"]["created"], 0);

    let list = app.get("/questions", Some(&cookie)).await;
    let ids: Vec<i64> = list.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 1]);
}

#[tokio::test]
async fn test_sync_without_token_asks_for_authorization() {
    let app = TestApp::new(MockGateways::default());
    let cookie = app.session_cookie(SELLER_ID);

    let resp = app.post("/questions/sync", Some(&cookie)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_code(), Some("authorization_required"));
    assert_eq!(resp.body["error"]["login_url"], "/auth/meli/login");
}

#[tokio::test]
async fn test_sync_with_revoked_refresh_asks_for_reauthorization() {
    let mut mocks = MockGateways::default();
    mocks
        .oauth
        .expect_refresh()
        .once()
        .returning(|_| Err(SyncError::AuthExchange("invalid_grant".into())));
    mocks.orders.expect_get_orders().never();
    let app = TestApp::new(mocks);
    let expired = token("APP_USR-old", "TG-revoked", Utc::now() - TimeDelta::hours(1));
    app.seed_seller(&expired).await;
    let cookie = app.session_cookie(SELLER_ID);

    let resp = app.post("/orders/sync", Some(&cookie)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_code(), Some("reauthorization_required"));
    assert_eq!(
        TokenStore::get(app.store.as_ref(), SELLER_ID).await.unwrap(),
        Some(expired)
    );
}

#[tokio::test]
async fn test_sync_api_error_is_bad_gateway() {
    let mut mocks = MockGateways::default();
    mocks
        .orders
        .expect_get_orders()
        .returning(|_| Err(SyncError::api(503, "unavailable")));
    let app = TestApp::new(mocks);
    app.seed_seller(&fresh_token()).await;
    let cookie = app.session_cookie(SELLER_ID);

    let resp = app.post("/orders/sync", Some(&cookie)).await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert_eq!(resp.error_code(), Some("api_error"));
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_sync_orders_and_list() {
    let mut mocks = MockGateways::default();
    mocks
        .orders
        .expect_get_orders()
        .returning(|_| Ok(vec![order(10, "paid"), order(11, "confirmed")]));
    let app = TestApp::new(mocks);
    app.seed_seller(&fresh_token()).await;
    let cookie = app.session_cookie(SELLER_ID);

    let resp = app.post("/orders/sync", Some(&cookie)).await;
    assert_eq!(resp.body["data"]["created"], 2);

    let list = app.get("/orders", Some(&cookie)).await;
    let orders = list.body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["items"][0]["title"], "Mate");
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn test_notifications_read_flow() {
    let app = TestApp::new(MockGateways::default());
    app.seed_seller(&fresh_token()).await;
    let cookie = app.session_cookie(SELLER_ID);

    for question_id in [1, 2] {
        let notification =
            notifications::question_received(SELLER_ID, question_id, "Is it available?");
        NotificationRepository::save(app.store.as_ref(), &notification)
            .await
            .unwrap();
    }

    let all = app.get("/notifications", Some(&cookie)).await;
    let items = all.body["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let newest = items[0]["id"].as_i64().unwrap();

    let read = app
        .post(&format!("/notifications/{newest}/read"), Some(&cookie))
        .await;
    assert_eq!(read.status, StatusCode::OK);
    assert!(!read.body["data"]["read_at"].is_null());

    let unread = app
        .get("/notifications?unread_only=true", Some(&cookie))
        .await;
    assert_eq!(unread.body["data"].as_array().unwrap().len(), 1);

    // Someone else's notification is invisible.
    let other = app.session_cookie(SELLER_ID + 1);
    let resp = app
        .post(&format!("/notifications/{newest}/read"), Some(&other))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
