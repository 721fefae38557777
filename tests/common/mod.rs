#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeDelta, Utc};
use http_body_util::BodyExt;
use meli_sync::api::session;
use meli_sync::crypto::CryptoEngine;
use meli_sync::error::SyncError;
use meli_sync::meli::{
    MeliOrder, MeliQuestion, MeliToken, MeliUserInfo, OAuthGateway, OrderGateway,
    QuestionGateway, UserGateway,
};
use meli_sync::store::{MemoryStore, TokenStore, UserRepository};
use meli_sync::{api, AppState, Config, Gateways, SharedState};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Gateway mocks
// ============================================================================

mock! {
    pub OAuthGateway {}

    #[async_trait::async_trait]
    impl OAuthGateway for OAuthGateway {
        fn authorization_url(&self, state: &str) -> String;
        async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<MeliToken, SyncError>;
        async fn refresh(&self, token: &MeliToken) -> Result<MeliToken, SyncError>;
    }
}

mock! {
    pub UserGateway {}

    #[async_trait::async_trait]
    impl UserGateway for UserGateway {
        async fn get_user_info(&self, token: &MeliToken) -> Result<MeliUserInfo, SyncError>;
    }
}

mock! {
    pub QuestionGateway {}

    #[async_trait::async_trait]
    impl QuestionGateway for QuestionGateway {
        async fn get_questions(&self, token: &MeliToken) -> Result<Vec<MeliQuestion>, SyncError>;
    }
}

mock! {
    pub OrderGateway {}

    #[async_trait::async_trait]
    impl OrderGateway for OrderGateway {
        async fn get_orders(&self, token: &MeliToken) -> Result<Vec<MeliOrder>, SyncError>;
    }
}

/// Gateway doubles; anything left unconfigured panics when called.
#[derive(Default)]
pub struct MockGateways {
    pub oauth: MockOAuthGateway,
    pub users: MockUserGateway,
    pub questions: MockQuestionGateway,
    pub orders: MockOrderGateway,
}

impl MockGateways {
    pub fn into_gateways(self) -> Gateways {
        Gateways {
            oauth: Arc::new(self.oauth),
            users: Arc::new(self.users),
            questions: Arc::new(self.questions),
            orders: Arc::new(self.orders),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const SELLER_ID: i64 = 123456;
pub const LANDING_URL: &str = "/dashboard";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        landing_url: LANDING_URL.into(),
        debug: false,
        database_url: String::new(),
        secret_key: "integration-test-secret".into(),
        meli_client_id: "client-123".into(),
        meli_client_secret: "secret-456".into(),
        meli_redirect_uri: "http://localhost/auth/meli/callback".into(),
        meli_api_url: "http://meli.invalid".into(),
        meli_auth_url: "https://auth.example.com/authorization".into(),
        token_refresh_skew_secs: 300,
    }
}

pub fn token(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> MeliToken {
    MeliToken {
        user_id: SELLER_ID,
        access_token: access.into(),
        refresh_token: refresh.into(),
        expires_at,
    }
}

pub fn fresh_token() -> MeliToken {
    token("APP_USR-access", "TG-refresh", Utc::now() + TimeDelta::hours(6))
}

pub fn user_info() -> MeliUserInfo {
    MeliUserInfo {
        id: SELLER_ID,
        email: "seller@example.com".into(),
        nickname: "SELLER_TEST".into(),
        first_name: Some("Ana".into()),
        last_name: Some("Silva".into()),
    }
}

pub fn question(id: i64, status: &str) -> MeliQuestion {
    serde_json::from_value(json!({
        "id": id,
        "item_id": "MLB123456",
        "text": format!("Question number {id}"),
        "status": status,
        "date_created": format!("2024-01-{:02}T10:30:00.000-03:00", id % 28 + 1),
        "from": { "id": 99999 }
    }))
    .unwrap()
}

pub fn order(id: i64, status: &str) -> MeliOrder {
    serde_json::from_value(json!({
        "id": id,
        "status": status,
        "date_created": "2024-02-01T10:00:00.000-03:00",
        "last_updated": "2024-02-01T10:05:00.000-03:00",
        "buyer": { "id": 555, "nickname": "BUYER" },
        "order_items": [
            { "item": { "id": "MLB1", "title": "Mate" }, "quantity": 2, "unit_price": 10.5 }
        ],
        "total_amount": 21.0
    }))
    .unwrap()
}

pub struct TestApp {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

impl TestApp {
    pub fn new(gateways: MockGateways) -> Self {
        let config = test_config();
        let crypto = Arc::new(CryptoEngine::new(&config.secret_key).unwrap());
        let store = Arc::new(MemoryStore::new());
        let state: SharedState = Arc::new(AppState::new(
            config,
            crypto,
            store.clone(),
            gateways.into_gateways(),
        ));

        Self {
            router: api::router(state.clone()),
            state,
            store,
        }
    }

    /// Registered seller with a stored token.
    pub async fn seed_seller(&self, token: &MeliToken) {
        UserRepository::create(self.store.as_ref(), &user_info())
            .await
            .unwrap();
        TokenStore::save(self.store.as_ref(), token).await.unwrap();
    }

    /// Signed OAuth state and the nonce cookie the login redirect pairs it with.
    pub fn login_state(&self) -> (String, String) {
        let nonce = session::new_state_nonce();
        let state = session::sign_login_state(&self.state.crypto, &nonce, Utc::now()).unwrap();
        (state, format!("{}={nonce}", session::STATE_COOKIE))
    }

    /// Callback from the browser that started the login.
    pub async fn callback(&self, code: &str) -> TestResponse {
        let (state, cookie) = self.login_state();
        self.get(
            &format!("/auth/meli/callback?code={code}&state={state}"),
            Some(&cookie),
        )
        .await
    }

    pub fn session_cookie(&self, meli_user_id: i64) -> String {
        let value = session::issue_session(&self.state.crypto, meli_user_id, Utc::now()).unwrap();
        format!("{}={value}", session::SESSION_COOKIE)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send("GET", uri, cookie).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send("POST", uri, cookie).await
    }

    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response = self
            .router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}
