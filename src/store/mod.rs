//! Persistence contracts and their backends.
//!
//! - [`PgStore`]: PostgreSQL, tokens encrypted at rest
//! - [`MemoryStore`]: in-process maps for tests and local runs
//!
//! The token store exclusively owns token rows; each repository exclusively
//! owns its resource rows. A notification raised by an upsert is written in
//! the same transaction as the row that raised it.

pub mod db;
pub mod mem;
mod types;

pub use db::PgStore;
pub use mem::MemoryStore;
pub use types::*;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::meli::{MeliToken, MeliUserInfo};

/// OAuth credentials, one row per MercadoLibre account.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: i64) -> Result<Option<MeliToken>, SyncError>;

    /// Insert or replace the token keyed by `user_id`.
    async fn save(&self, token: &MeliToken) -> Result<(), SyncError>;
}

/// MercadoLibre accounts and the local accounts that own them.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, meli_user_id: i64) -> Result<Option<MeliUser>, SyncError>;

    /// Create the local account and its MeliUser together.
    async fn create(&self, info: &MeliUserInfo) -> Result<MeliUser, SyncError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Upsert keyed by the question's MercadoLibre id.
    ///
    /// `on_create` is stored in the same write when the question is new.
    async fn save_or_update(
        &self,
        question: &QuestionUpsert,
        on_create: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError>;

    /// Questions of one seller, newest first.
    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Question>, SyncError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Upsert keyed by the order id; items and payments are replaced wholesale.
    ///
    /// `on_status_change` is stored in the same write when the order is new
    /// or its status differs from the stored one.
    async fn save_or_update(
        &self,
        order: &OrderUpsert,
        on_status_change: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError>;

    /// Orders of one seller, newest first.
    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Order>, SyncError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: &NewNotification) -> Result<Notification, SyncError>;

    /// Notifications of one seller, newest first.
    async fn get_by_user(
        &self,
        meli_user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, SyncError>;

    /// Mark as read. Fails with `NotFound` if the notification is not the user's.
    async fn mark_as_read(
        &self,
        meli_user_id: i64,
        notification_id: i64,
    ) -> Result<Notification, SyncError>;
}
