use async_trait::async_trait;
use serde::Deserialize;

use super::{MeliClient, MeliToken};
use crate::error::SyncError;

/// Profile of the account that owns a token (`/users/me`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeliUserInfo {
    pub id: i64,
    #[serde(default)]
    pub email: String,
    pub nickname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait UserGateway: Send + Sync {
    async fn get_user_info(&self, token: &MeliToken) -> Result<MeliUserInfo, SyncError>;
}

pub struct MeliUserApiGateway {
    client: MeliClient,
}

impl MeliUserApiGateway {
    pub fn new(client: MeliClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserGateway for MeliUserApiGateway {
    async fn get_user_info(&self, token: &MeliToken) -> Result<MeliUserInfo, SyncError> {
        self.client.get("/users/me", token).await
    }
}
