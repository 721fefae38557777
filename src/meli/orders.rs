use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use super::{MeliClient, MeliToken};
use crate::error::SyncError;

fn default_currency() -> String {
    "BRL".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliPhone {
    pub area_code: Option<String>,
    pub number: Option<String>,
}

impl MeliPhone {
    /// "area number", or `None` when both parts are blank.
    pub fn display(&self) -> Option<String> {
        let joined = format!(
            "{} {}",
            self.area_code.as_deref().unwrap_or_default(),
            self.number.as_deref().unwrap_or_default()
        );
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliBuyer {
    pub id: i64,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<MeliPhone>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliListing {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliOrderItem {
    pub item: MeliListing,
    pub quantity: i32,
    pub unit_price: f64,
    #[serde(default = "default_currency")]
    pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliPayment {
    pub id: i64,
    pub transaction_amount: f64,
    pub currency_id: String,
    pub status: String,
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliShipping {
    pub id: Option<i64>,
}

/// An order as returned by `/orders/search`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeliOrder {
    pub id: i64,
    pub status: String,
    pub date_created: String,
    pub date_closed: Option<String>,
    pub last_updated: String,
    pub buyer: MeliBuyer,
    pub order_items: Vec<MeliOrderItem>,
    pub total_amount: f64,
    pub paid_amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency_id: String,
    #[serde(default)]
    pub payments: Vec<MeliPayment>,
    pub shipping: Option<MeliShipping>,
}

#[derive(Debug, Deserialize)]
struct OrderSearch {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Orders sold by the token's seller, newest first.
    async fn get_orders(&self, token: &MeliToken) -> Result<Vec<MeliOrder>, SyncError>;
}

pub struct MeliOrderApiGateway {
    client: MeliClient,
}

impl MeliOrderApiGateway {
    pub fn new(client: MeliClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderGateway for MeliOrderApiGateway {
    async fn get_orders(&self, token: &MeliToken) -> Result<Vec<MeliOrder>, SyncError> {
        let path = format!("/orders/search?seller={}&sort=date_desc", token.user_id);
        let search: OrderSearch = self.client.get(&path, token).await?;

        // One malformed order must not hide the rest of the page.
        let orders: Vec<MeliOrder> = search
            .results
            .into_iter()
            .filter_map(|raw| {
                let id = raw.get("id").cloned();
                match serde_json::from_value(raw) {
                    Ok(order) => Some(order),
                    Err(e) => {
                        error!("Failed to parse order {id:?}: {e}");
                        None
                    }
                }
            })
            .collect();

        info!(
            "Fetched {} orders from MercadoLibre for user {}",
            orders.len(),
            token.user_id
        );
        Ok(orders)
    }
}
