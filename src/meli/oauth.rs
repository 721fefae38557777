use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{MeliClient, MeliToken};
use crate::clock::{default_clock, Clock};
use crate::error::SyncError;

const DEFAULT_EXPIRES_IN: i64 = 3600;
const SCOPES: &str = "read write offline_access";

/// Token endpoint of the OAuth2 authorization-code flow.
///
/// No retries happen here: transport failures and rejections propagate to the
/// caller, which decides whether the user has to authorize again.
#[async_trait]
pub trait OAuthGateway: Send + Sync {
    /// Build the URL the browser is sent to for consent.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<MeliToken, SyncError>;

    /// Exchange the refresh token for a fresh token pair.
    async fn refresh(&self, token: &MeliToken) -> Result<MeliToken, SyncError>;
}

/// MercadoLibre OAuth 2.0 gateway.
///
/// Quirks:
/// - The token response carries the seller id as `user_id`.
/// - `offline_access` must be requested to get a refresh token.
/// - Refresh tokens are single use; the response carries the next one.
pub struct MeliOAuthGateway {
    client: MeliClient,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user_id: i64,
}

impl MeliOAuthGateway {
    pub fn new(
        client: MeliClient,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        auth_url: String,
    ) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            redirect_uri,
            auth_url,
            clock: default_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SyncError> {
        let resp = self
            .client
            .http()
            .post(self.client.url("/oauth/token"))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("Token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::AuthExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| SyncError::AuthExchange(format!("Failed to parse token response: {e}")))
    }

    /// Absolute expiry for a provider-reported lifetime in seconds.
    fn expires_at(&self, expires_in: Option<i64>) -> Result<DateTime<Utc>, SyncError> {
        let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        if secs <= 0 {
            return Err(SyncError::AuthExchange(format!(
                "malformed expires_in: {secs}"
            )));
        }

        TimeDelta::try_seconds(secs)
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| SyncError::AuthExchange(format!("malformed expires_in: {secs}")))
    }
}

#[async_trait]
impl OAuthGateway for MeliOAuthGateway {
    fn authorization_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .finish();
        format!("{}?{}", self.auth_url, query)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<MeliToken, SyncError> {
        let resp = self
            .post_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        let refresh_token = resp.refresh_token.ok_or_else(|| {
            SyncError::AuthExchange("token response has no refresh_token (offline_access)".into())
        })?;

        info!("Exchanged authorization code for user {}", resp.user_id);

        Ok(MeliToken {
            user_id: resp.user_id,
            expires_at: self.expires_at(resp.expires_in)?,
            access_token: resp.access_token,
            refresh_token,
        })
    }

    async fn refresh(&self, token: &MeliToken) -> Result<MeliToken, SyncError> {
        let resp = self
            .post_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("refresh_token", &token.refresh_token),
            ])
            .await?;

        if resp.user_id != token.user_id {
            warn!(
                "Refresh for user {} answered with user {}",
                token.user_id, resp.user_id
            );
            return Err(SyncError::AuthExchange(
                "refreshed token belongs to another user".into(),
            ));
        }

        Ok(MeliToken {
            user_id: token.user_id,
            expires_at: self.expires_at(resp.expires_in)?,
            access_token: resp.access_token,
            refresh_token: resp
                .refresh_token
                .unwrap_or_else(|| token.refresh_token.clone()),
        })
    }
}
