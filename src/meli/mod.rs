//! MercadoLibre boundary: OAuth token endpoint and REST resource gateways.
//!
//! Every external capability sits behind its own trait so the sync service
//! and the HTTP handlers can be wired with test doubles.

mod client;
mod oauth;
mod orders;
mod questions;
mod users;

pub use client::MeliClient;
pub use oauth::{MeliOAuthGateway, OAuthGateway};
pub use orders::{
    MeliBuyer, MeliOrder, MeliOrderApiGateway, MeliOrderItem, MeliPayment, OrderGateway,
};
pub use questions::{MeliAnswer, MeliQuestion, MeliQuestionApiGateway, QuestionGateway};
pub use users::{MeliUserApiGateway, MeliUserInfo, UserGateway};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credentials for one MercadoLibre account.
///
/// Replaced wholesale on every refresh, never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeliToken {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl MeliToken {
    /// True when the token is already expired or will expire within `skew`.
    pub fn expires_within(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        self.expires_at - skew <= now
    }
}
