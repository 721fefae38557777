//! Notifications raised by sync and the service that reads them back.
//!
//! Sync builds a [`NewNotification`] up front and hands it to the repository
//! with the upsert, so the notification is stored with the row that raised it.

use std::sync::Arc;

use crate::error::SyncError;
use crate::store::{NewNotification, Notification, NotificationKind, NotificationRepository};

const PREVIEW_CHARS: usize = 100;

/// Notification for a question seen for the first time.
pub fn question_received(meli_user_id: i64, question_id: i64, text: &str) -> NewNotification {
    NewNotification {
        meli_user_id,
        kind: NotificationKind::Question,
        title: "New question received".into(),
        message: format!("Question: {}", preview(text)),
        question_id: Some(question_id),
        order_id: None,
        status_change: None,
    }
}

/// Notification for an order seen for the first time or whose status changed.
pub fn order_status_changed(meli_user_id: i64, order_id: i64, status: &str) -> NewNotification {
    let title = match status {
        "paid" => "Your order has been paid".to_string(),
        "confirmed" => "Your order has been confirmed".to_string(),
        "payment_required" => "Your order requires payment".to_string(),
        _ => format!("Order #{order_id} updated"),
    };

    NewNotification {
        meli_user_id,
        kind: NotificationKind::Order,
        title,
        message: format!("Order #{order_id} changed status to: {status}"),
        question_id: None,
        order_id: Some(order_id),
        status_change: Some(status.to_string()),
    }
}

pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>) -> Self {
        Self { repository }
    }

    pub async fn list(
        &self,
        meli_user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, SyncError> {
        self.repository.get_by_user(meli_user_id, unread_only).await
    }

    pub async fn mark_as_read(
        &self,
        meli_user_id: i64,
        notification_id: i64,
    ) -> Result<Notification, SyncError> {
        self.repository
            .mark_as_read(meli_user_id, notification_id)
            .await
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
