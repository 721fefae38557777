use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{MeliClient, MeliToken};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeliAnswer {
    pub text: String,
    pub date_created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeliAsker {
    pub id: i64,
}

/// A buyer question as returned by `/questions/search`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeliQuestion {
    pub id: i64,
    pub item_id: String,
    pub text: String,
    pub status: String,
    pub date_created: String,
    pub from: MeliAsker,
    #[serde(default)]
    pub answer: Option<MeliAnswer>,
}

#[derive(Debug, Deserialize)]
struct QuestionSearch {
    #[serde(default)]
    questions: Vec<MeliQuestion>,
}

#[async_trait]
pub trait QuestionGateway: Send + Sync {
    /// Questions received by the token's seller, in API order.
    async fn get_questions(&self, token: &MeliToken) -> Result<Vec<MeliQuestion>, SyncError>;
}

pub struct MeliQuestionApiGateway {
    client: MeliClient,
}

impl MeliQuestionApiGateway {
    pub fn new(client: MeliClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuestionGateway for MeliQuestionApiGateway {
    async fn get_questions(&self, token: &MeliToken) -> Result<Vec<MeliQuestion>, SyncError> {
        let path = format!(
            "/questions/search?seller_id={}&sort_fields=date_created",
            token.user_id
        );
        let search: QuestionSearch = self.client.get(&path, token).await?;

        info!(
            "Fetched {} questions from MercadoLibre for user {}",
            search.questions.len(),
            token.user_id
        );
        Ok(search.questions)
    }
}
