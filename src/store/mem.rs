use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    LocalUser, MeliUser, NewNotification, Notification, NotificationRepository, Order,
    OrderRepository, OrderUpsert, Question, QuestionRepository, QuestionUpsert, TokenStore,
    Upsert, UserRepository,
};
use crate::clock::{default_clock, Clock};
use crate::error::SyncError;
use crate::meli::{MeliToken, MeliUserInfo};

#[derive(Default)]
struct Tables {
    tokens: HashMap<i64, MeliToken>,
    users: HashMap<i64, MeliUser>,
    next_local_user_id: i64,
    questions: HashMap<i64, Question>,
    orders: HashMap<i64, Order>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn push_notification(&mut self, n: &NewNotification, now: DateTime<Utc>) -> Notification {
        let notification = Notification {
            id: self.notifications.len() as i64 + 1,
            meli_user_id: n.meli_user_id,
            kind: n.kind,
            title: n.title.clone(),
            message: n.message.clone(),
            question_id: n.question_id,
            order_id: n.order_id,
            status_change: n.status_change.clone(),
            created_at: now,
            read_at: None,
        };
        self.notifications.push(notification.clone());
        notification
    }
}

/// In-memory store implementing every persistence contract.
///
/// Used as the repository double in tests and for running without a database.
/// Not durable.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(default_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }

    pub async fn token_count(&self) -> usize {
        self.tables.read().await.tokens.len()
    }

    pub async fn question_count(&self) -> usize {
        self.tables.read().await.questions.len()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, user_id: i64) -> Result<Option<MeliToken>, SyncError> {
        Ok(self.tables.read().await.tokens.get(&user_id).cloned())
    }

    async fn save(&self, token: &MeliToken) -> Result<(), SyncError> {
        self.tables
            .write()
            .await
            .tokens
            .insert(token.user_id, token.clone());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get(&self, meli_user_id: i64) -> Result<Option<MeliUser>, SyncError> {
        Ok(self.tables.read().await.users.get(&meli_user_id).cloned())
    }

    async fn create(&self, info: &MeliUserInfo) -> Result<MeliUser, SyncError> {
        let mut tables = self.tables.write().await;

        if tables.users.contains_key(&info.id) {
            return Err(SyncError::BadRequest(format!(
                "MeliUser {} already registered",
                info.id
            )));
        }
        if tables
            .users
            .values()
            .any(|u| u.user.username == info.nickname)
        {
            return Err(SyncError::BadRequest(format!(
                "username {} already taken",
                info.nickname
            )));
        }

        tables.next_local_user_id += 1;
        let meli_user = MeliUser {
            id: info.id,
            user: LocalUser {
                id: tables.next_local_user_id,
                username: info.nickname.clone(),
                email: info.email.clone(),
                first_name: info.first_name.clone(),
                last_name: info.last_name.clone(),
            },
            created_at: self.clock.now(),
        };
        tables.users.insert(info.id, meli_user.clone());
        Ok(meli_user)
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn save_or_update(
        &self,
        q: &QuestionUpsert,
        on_create: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;

        let (created_at, outcome) = match tables.questions.get(&q.id) {
            Some(existing) => (
                existing.created_at,
                Upsert::Updated {
                    previous_status: existing.status.clone(),
                },
            ),
            None => (now, Upsert::Created),
        };

        tables.questions.insert(
            q.id,
            Question {
                id: q.id,
                meli_user_id: q.meli_user_id,
                item_id: q.item_id.clone(),
                text: q.text.clone(),
                status: q.status.clone(),
                date_created: q.date_created,
                from_user_id: q.from_user_id,
                answer_text: q.answer_text.clone(),
                answer_date_created: q.answer_date_created,
                created_at,
                updated_at: now,
            },
        );
        if let Some(n) = on_create.filter(|_| outcome.is_created()) {
            tables.push_notification(n, now);
        }
        Ok(outcome)
    }

    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Question>, SyncError> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.meli_user_id == meli_user_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        Ok(questions)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn save_or_update(
        &self,
        o: &OrderUpsert,
        on_status_change: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;

        let (created_at, outcome) = match tables.orders.get(&o.id) {
            Some(existing) => (
                existing.created_at,
                Upsert::Updated {
                    previous_status: existing.status.clone(),
                },
            ),
            None => (now, Upsert::Created),
        };

        tables.orders.insert(
            o.id,
            Order {
                id: o.id,
                meli_user_id: o.meli_user_id,
                status: o.status.clone(),
                date_created: o.date_created,
                date_closed: o.date_closed,
                last_updated: o.last_updated,
                buyer: o.buyer.clone(),
                total_amount: o.total_amount,
                paid_amount: o.paid_amount,
                currency_id: o.currency_id.clone(),
                shipping_id: o.shipping_id,
                items: o.items.clone(),
                payments: o.payments.clone(),
                created_at,
                updated_at: now,
            },
        );
        if let Some(n) = on_status_change.filter(|_| outcome.status_changed(&o.status)) {
            tables.push_notification(n, now);
        }
        Ok(outcome)
    }

    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Order>, SyncError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.meli_user_id == meli_user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        Ok(orders)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn save(&self, n: &NewNotification) -> Result<Notification, SyncError> {
        let now = self.clock.now();
        Ok(self.tables.write().await.push_notification(n, now))
    }

    async fn get_by_user(
        &self,
        meli_user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, SyncError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.meli_user_id == meli_user_id)
            .filter(|n| !unread_only || !n.is_read())
            .cloned()
            .collect())
    }

    async fn mark_as_read(
        &self,
        meli_user_id: i64,
        notification_id: i64,
    ) -> Result<Notification, SyncError> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.meli_user_id == meli_user_id)
            .ok_or_else(|| SyncError::NotFound("notification".into()))?;

        if notification.read_at.is_none() {
            notification.read_at = Some(now);
        }
        Ok(notification.clone())
    }
}
