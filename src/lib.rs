pub mod accounts;
pub mod api;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod meli;
pub mod notifications;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::SyncError;

use std::sync::Arc;

use accounts::AccountService;
use crypto::CryptoEngine;
use meli::{
    MeliClient, MeliOAuthGateway, MeliOrderApiGateway, MeliQuestionApiGateway,
    MeliUserApiGateway, OAuthGateway, OrderGateway, QuestionGateway, UserGateway,
};
use notifications::NotificationService;
use store::{
    NotificationRepository, OrderRepository, QuestionRepository, TokenStore, UserRepository,
};
use sync::SyncService;

/// Outbound MercadoLibre collaborators.
#[derive(Clone)]
pub struct Gateways {
    pub oauth: Arc<dyn OAuthGateway>,
    pub users: Arc<dyn UserGateway>,
    pub questions: Arc<dyn QuestionGateway>,
    pub orders: Arc<dyn OrderGateway>,
}

impl Gateways {
    /// Live gateways against the configured MercadoLibre endpoints.
    pub fn meli(config: &Config) -> Self {
        let client = MeliClient::new(config.meli_api_url.clone());
        Self {
            oauth: Arc::new(MeliOAuthGateway::new(
                client.clone(),
                config.meli_client_id.clone(),
                config.meli_client_secret.clone(),
                config.meli_redirect_uri.clone(),
                config.meli_auth_url.clone(),
            )),
            users: Arc::new(MeliUserApiGateway::new(client.clone())),
            questions: Arc::new(MeliQuestionApiGateway::new(client.clone())),
            orders: Arc::new(MeliOrderApiGateway::new(client)),
        }
    }
}

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub crypto: Arc<CryptoEngine>,
    pub accounts: AccountService,
    pub sync: Arc<SyncService>,
    pub questions: Arc<dyn QuestionRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    /// Wire every service over one store backend.
    pub fn new<S>(
        config: Config,
        crypto: Arc<CryptoEngine>,
        store: Arc<S>,
        gateways: Gateways,
    ) -> Self
    where
        S: TokenStore
            + UserRepository
            + QuestionRepository
            + OrderRepository
            + NotificationRepository
            + 'static,
    {
        let notifications = Arc::new(NotificationService::new(store.clone()));

        let sync = Arc::new(
            SyncService::new(
                store.clone(),
                gateways.oauth.clone(),
                gateways.questions,
                store.clone(),
                gateways.orders,
                store.clone(),
            )
            .with_refresh_skew(config.token_refresh_skew()),
        );

        let accounts = AccountService::new(
            gateways.oauth,
            gateways.users,
            store.clone(),
            store.clone(),
            sync.clone(),
            config.meli_redirect_uri.clone(),
        );

        Self {
            config,
            crypto,
            accounts,
            sync,
            questions: store.clone(),
            orders: store,
            notifications,
        }
    }
}

pub type SharedState = Arc<AppState>;
