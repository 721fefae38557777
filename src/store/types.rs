use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Accounts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A MercadoLibre account, one-to-one with a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeliUser {
    pub id: i64,
    pub user: LocalUser,
    pub created_at: DateTime<Utc>,
}

// ── Upsert outcome ───────────────────────────────────────────────────────────

/// What a keyed upsert did to the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated { previous_status: String },
}

impl Upsert {
    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created)
    }

    /// True for new rows and for rows whose status differs from `status`.
    pub fn status_changed(&self, status: &str) -> bool {
        match self {
            Upsert::Created => true,
            Upsert::Updated { previous_status } => previous_status != status,
        }
    }
}

// ── Questions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionUpsert {
    pub id: i64,
    pub meli_user_id: i64,
    pub item_id: String,
    pub text: String,
    pub status: String,
    pub date_created: DateTime<Utc>,
    pub from_user_id: i64,
    pub answer_text: Option<String>,
    pub answer_date_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: i64,
    pub meli_user_id: i64,
    pub item_id: String,
    pub text: String,
    pub status: String,
    pub date_created: DateTime<Utc>,
    pub from_user_id: i64,
    pub answer_text: Option<String>,
    pub answer_date_created: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Buyer {
    pub id: i64,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub item_id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub payment_id: i64,
    pub transaction_amount: f64,
    pub currency_id: String,
    pub status: String,
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpsert {
    pub id: i64,
    pub meli_user_id: i64,
    pub status: String,
    pub date_created: DateTime<Utc>,
    pub date_closed: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub buyer: Buyer,
    pub total_amount: f64,
    pub paid_amount: Option<f64>,
    pub currency_id: String,
    pub shipping_id: Option<i64>,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub meli_user_id: i64,
    pub status: String,
    pub date_created: DateTime<Utc>,
    pub date_closed: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub buyer: Buyer,
    pub total_amount: f64,
    pub paid_amount: Option<f64>,
    pub currency_id: String,
    pub shipping_id: Option<i64>,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Notifications ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Question,
    Order,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Question => "question",
            NotificationKind::Order => "order",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "question" => Some(NotificationKind::Question),
            "order" => Some(NotificationKind::Order),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub meli_user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub question_id: Option<i64>,
    pub order_id: Option<i64>,
    pub status_change: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub meli_user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub question_id: Option<i64>,
    pub order_id: Option<i64>,
    pub status_change: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
