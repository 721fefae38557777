//! OAuth callback orchestration: exchange the code, register the account on
//! first login, persist the token and kick off the initial sync.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::meli::{MeliToken, OAuthGateway, UserGateway};
use crate::store::{MeliUser, TokenStore, UserRepository};
use crate::sync::SyncService;

/// Result of a completed authorization-code callback.
#[derive(Debug, Clone)]
pub struct Login {
    pub meli_user: MeliUser,
    pub token: MeliToken,
    /// True when this login created the account.
    pub registered: bool,
}

pub struct AccountService {
    oauth: Arc<dyn OAuthGateway>,
    user_gateway: Arc<dyn UserGateway>,
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenStore>,
    sync: Arc<SyncService>,
    redirect_uri: String,
}

impl AccountService {
    pub fn new(
        oauth: Arc<dyn OAuthGateway>,
        user_gateway: Arc<dyn UserGateway>,
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenStore>,
        sync: Arc<SyncService>,
        redirect_uri: String,
    ) -> Self {
        Self {
            oauth,
            user_gateway,
            users,
            tokens,
            sync,
            redirect_uri,
        }
    }

    pub fn login_url(&self, state: &str) -> String {
        self.oauth.authorization_url(state)
    }

    pub async fn get_user(&self, meli_user_id: i64) -> Result<Option<MeliUser>, SyncError> {
        self.users.get(meli_user_id).await
    }

    /// Complete the authorization-code flow for `code`.
    pub async fn handle_callback(&self, code: &str) -> Result<Login, SyncError> {
        let token = self.oauth.exchange_code(code, &self.redirect_uri).await?;

        let (meli_user, registered) = match self.users.get(token.user_id).await? {
            Some(user) => (user, false),
            None => (self.register(&token).await?, true),
        };

        self.tokens.save(&token).await?;

        if registered {
            self.initial_sync(meli_user.id).await;
        }

        info!(
            "User {} ({}) logged in",
            meli_user.id, meli_user.user.username
        );
        Ok(Login {
            meli_user,
            token,
            registered,
        })
    }

    async fn register(&self, token: &MeliToken) -> Result<MeliUser, SyncError> {
        let info = self.user_gateway.get_user_info(token).await?;
        if info.id != token.user_id {
            return Err(SyncError::Provider(format!(
                "/users/me returned user {} for token of user {}",
                info.id, token.user_id
            )));
        }

        let meli_user = self.users.create(&info).await?;
        info!("Registered MercadoLibre user {} as {}", meli_user.id, info.nickname);
        Ok(meli_user)
    }

    /// Failures here never abort the login.
    async fn initial_sync(&self, meli_user_id: i64) {
        if let Err(e) = self.sync.sync_questions(meli_user_id).await {
            warn!("Initial question sync for user {meli_user_id} failed: {e}");
        }
        if let Err(e) = self.sync.sync_orders(meli_user_id).await {
            warn!("Initial order sync for user {meli_user_id} failed: {e}");
        }
    }
}
