use serde::de::DeserializeOwned;
use tracing::debug;

use super::MeliToken;
use crate::error::SyncError;

/// Thin bearer-authenticated HTTP client for the MercadoLibre REST API.
///
/// Cheap to clone; all gateways share one connection pool.
#[derive(Clone)]
pub struct MeliClient {
    http: reqwest::Client,
    base_url: String,
}

impl MeliClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` with the token as bearer credentials and decode the JSON body.
    ///
    /// Non-2xx answers become [`SyncError::Api`] carrying the status and body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &MeliToken,
    ) -> Result<T, SyncError> {
        debug!("GET {path} for user {}", token.user_id);

        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&token.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("GET {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::api(status.as_u16(), body));
        }

        resp.json()
            .await
            .map_err(|e| SyncError::Provider(format!("Failed to parse {path} response: {e}")))
    }
}
