//! Token lifecycle and resource synchronization.
//!
//! [`SyncService`] is the only component that triggers a token refresh:
//! handlers ask it for a valid token or a sync, never the OAuth gateway
//! directly.

mod convert;
mod refresh;


pub use refresh::RefreshLocks;

use chrono::TimeDelta;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{default_clock, Clock};
use crate::error::SyncError;
use crate::meli::{MeliToken, OAuthGateway, OrderGateway, QuestionGateway};
use crate::notifications;
use crate::store::{OrderRepository, QuestionRepository, TokenStore, Upsert};

const DEFAULT_REFRESH_SKEW_SECS: i64 = 300;

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records returned by the API.
    pub fetched: usize,
    /// Records written (created + updated).
    pub upserted: usize,
    pub created: usize,
    pub updated: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: &Upsert) {
        self.upserted += 1;
        if outcome.is_created() {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }
}

pub struct SyncService {
    tokens: Arc<dyn TokenStore>,
    oauth: Arc<dyn OAuthGateway>,
    question_gateway: Arc<dyn QuestionGateway>,
    questions: Arc<dyn QuestionRepository>,
    order_gateway: Arc<dyn OrderGateway>,
    orders: Arc<dyn OrderRepository>,
    refresh_locks: RefreshLocks,
    refresh_skew: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        oauth: Arc<dyn OAuthGateway>,
        question_gateway: Arc<dyn QuestionGateway>,
        questions: Arc<dyn QuestionRepository>,
        order_gateway: Arc<dyn OrderGateway>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        Self {
            tokens,
            oauth,
            question_gateway,
            questions,
            order_gateway,
            orders,
            refresh_locks: RefreshLocks::new(),
            refresh_skew: TimeDelta::seconds(DEFAULT_REFRESH_SKEW_SECS),
            clock: default_clock(),
        }
    }

    pub fn with_refresh_skew(mut self, skew: TimeDelta) -> Self {
        self.refresh_skew = skew.max(TimeDelta::zero());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn load_token(&self, user_id: i64) -> Result<MeliToken, SyncError> {
        self.tokens
            .get(user_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("token for user {user_id}")))
    }

    fn needs_refresh(&self, token: &MeliToken) -> bool {
        token.expires_within(self.clock.now(), self.refresh_skew)
    }

    /// Return a token that stays valid for at least the refresh skew,
    /// refreshing and persisting it first if needed.
    ///
    /// A rejected refresh leaves the stored token untouched and surfaces as
    /// [`SyncError::AuthExchange`].
    pub async fn ensure_valid_token(&self, user_id: i64) -> Result<MeliToken, SyncError> {
        let token = self.load_token(user_id).await?;
        if !self.needs_refresh(&token) {
            return Ok(token);
        }

        let _guard = self.refresh_locks.acquire(user_id).await;

        // Another request may have refreshed while we waited for the lock.
        let token = self.load_token(user_id).await?;
        if !self.needs_refresh(&token) {
            return Ok(token);
        }

        info!(
            "Refreshing token for user {user_id} (expires at {})",
            token.expires_at
        );
        let refreshed = self.oauth.refresh(&token).await.inspect_err(|e| {
            warn!("Token refresh for user {user_id} failed: {e}");
        })?;
        self.tokens.save(&refreshed).await?;

        Ok(refreshed)
    }

    /// Pull the seller's questions and upsert them by question id.
    pub async fn sync_questions(&self, user_id: i64) -> Result<SyncReport, SyncError> {
        let token = self.ensure_valid_token(user_id).await?;
        let fetched = self.question_gateway.get_questions(&token).await?;

        // Map everything before writing so a bad payload leaves the store as it was.
        let records = fetched
            .into_iter()
            .map(|q| convert::question_upsert(user_id, q))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = SyncReport {
            fetched: records.len(),
            ..SyncReport::default()
        };

        for record in records {
            let notification = notifications::question_received(user_id, record.id, &record.text);
            let outcome = self
                .questions
                .save_or_update(&record, Some(&notification))
                .await?;
            if outcome.is_created() {
                info!("Created question notification for user {user_id}, question {}", record.id);
            }
            report.record(&outcome);
        }

        info!(
            "Synchronized {} questions for user {user_id} ({} new)",
            report.upserted, report.created
        );
        Ok(report)
    }

    /// Pull the seller's orders and upsert them by order id.
    pub async fn sync_orders(&self, user_id: i64) -> Result<SyncReport, SyncError> {
        let token = self.ensure_valid_token(user_id).await?;
        let fetched = self.order_gateway.get_orders(&token).await?;

        let records = fetched
            .into_iter()
            .map(|o| convert::order_upsert(user_id, o))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = SyncReport {
            fetched: records.len(),
            ..SyncReport::default()
        };

        for record in records {
            let notification =
                notifications::order_status_changed(user_id, record.id, &record.status);
            let outcome = self
                .orders
                .save_or_update(&record, Some(&notification))
                .await?;
            if outcome.status_changed(&record.status) {
                info!("Created order notification for user {user_id}, order {}", record.id);
            }
            report.record(&outcome);
        }

        info!(
            "Synchronized {} orders for user {user_id} ({} new)",
            report.upserted, report.created
        );
        Ok(report)
    }
}
