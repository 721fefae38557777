//! PostgreSQL-backed store for tokens, accounts and synced resources.
//!
//! Tables:
//! - `auth_users`: local accounts
//! - `meli_users`: MercadoLibre accounts, one-to-one with `auth_users`
//! - `meli_tokens`: encrypted OAuth tokens per MercadoLibre account
//! - `questions`, `orders`, `order_items`, `payments`: synced resources
//! - `notifications`: per-seller notifications raised by sync

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use super::{
    Buyer, LocalUser, MeliUser, NewNotification, Notification, NotificationKind,
    NotificationRepository, Order, OrderItem, OrderRepository, OrderUpsert, Payment, Question,
    QuestionRepository, QuestionUpsert, TokenStore, Upsert, UserRepository,
};
use crate::crypto::CryptoEngine;
use crate::error::SyncError;
use crate::meli::{MeliToken, MeliUserInfo};

/// Store backed by PostgreSQL.
pub struct PgStore {
    pool: PgPool,
    crypto: Arc<CryptoEngine>,
}

impl PgStore {
    pub async fn new(db_url: &str, crypto: Arc<CryptoEngine>) -> Result<Self, SyncError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool, crypto })
    }

    pub fn from_pool(pool: PgPool, crypto: Arc<CryptoEngine>) -> Self {
        Self { pool, crypto }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_users (
                id          BIGSERIAL PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL DEFAULT '',
                first_name  TEXT,
                last_name   TEXT,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meli_users (
                id          BIGINT PRIMARY KEY,
                user_id     BIGINT NOT NULL UNIQUE REFERENCES auth_users(id) ON DELETE CASCADE,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meli_tokens (
                meli_user_id    BIGINT PRIMARY KEY REFERENCES meli_users(id) ON DELETE CASCADE,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                expires_at      TIMESTAMPTZ NOT NULL,
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id                  BIGINT PRIMARY KEY,
                meli_user_id        BIGINT NOT NULL REFERENCES meli_users(id) ON DELETE CASCADE,
                item_id             TEXT NOT NULL,
                text                TEXT NOT NULL,
                status              TEXT NOT NULL,
                date_created        TIMESTAMPTZ NOT NULL,
                from_user_id        BIGINT NOT NULL,
                answer_text         TEXT,
                answer_date_created TIMESTAMPTZ,
                created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id                  BIGINT PRIMARY KEY,
                meli_user_id        BIGINT NOT NULL REFERENCES meli_users(id) ON DELETE CASCADE,
                status              TEXT NOT NULL,
                date_created        TIMESTAMPTZ NOT NULL,
                date_closed         TIMESTAMPTZ,
                last_updated        TIMESTAMPTZ NOT NULL,
                buyer_id            BIGINT NOT NULL,
                buyer_nickname      TEXT,
                buyer_email         TEXT,
                buyer_phone         TEXT,
                buyer_first_name    TEXT,
                buyer_last_name     TEXT,
                total_amount        DOUBLE PRECISION NOT NULL,
                paid_amount         DOUBLE PRECISION,
                currency_id         TEXT NOT NULL,
                shipping_id         BIGINT,
                created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_items (
                id          BIGSERIAL PRIMARY KEY,
                order_id    BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                item_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                quantity    INT NOT NULL,
                unit_price  DOUBLE PRECISION NOT NULL,
                currency_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                id                  BIGSERIAL PRIMARY KEY,
                order_id            BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                payment_id          BIGINT NOT NULL,
                transaction_amount  DOUBLE PRECISION NOT NULL,
                currency_id         TEXT NOT NULL,
                status              TEXT NOT NULL,
                payment_type        TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id              BIGSERIAL PRIMARY KEY,
                meli_user_id    BIGINT NOT NULL REFERENCES meli_users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL,
                title           TEXT NOT NULL,
                message         TEXT NOT NULL,
                question_id     BIGINT,
                order_id        BIGINT,
                status_change   TEXT,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                read_at         TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_questions_user ON questions(meli_user_id, date_created DESC)",
            "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(meli_user_id, date_created DESC)",
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
            "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)",
            "CREATE INDEX IF NOT EXISTS idx_payments_order ON payments(order_id)",
            "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(meli_user_id, created_at DESC)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn replace_order_lines(
        tx: &mut Transaction<'_, Postgres>,
        order: &OrderUpsert,
    ) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM payments WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, item_id, title, quantity, unit_price, currency_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(&item.item_id)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&item.currency_id)
            .execute(&mut **tx)
            .await?;
        }

        for payment in &order.payments {
            sqlx::query(
                r#"
                INSERT INTO payments
                    (order_id, payment_id, transaction_amount, currency_id, status, payment_type)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(payment.payment_id)
            .bind(payment.transaction_amount)
            .bind(&payment.currency_id)
            .bind(&payment.status)
            .bind(&payment.payment_type)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn order_lines(&self, order_id: i64) -> Result<(Vec<OrderItem>, Vec<Payment>), SyncError> {
        let items = sqlx::query(
            r#"
            SELECT item_id, title, quantity, unit_price, currency_id
            FROM order_items WHERE order_id = $1 ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| OrderItem {
            item_id: row.get(0),
            title: row.get(1),
            quantity: row.get(2),
            unit_price: row.get(3),
            currency_id: row.get(4),
        })
        .collect();

        let payments = sqlx::query(
            r#"
            SELECT payment_id, transaction_amount, currency_id, status, payment_type
            FROM payments WHERE order_id = $1 ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| Payment {
            payment_id: row.get(0),
            transaction_amount: row.get(1),
            currency_id: row.get(2),
            status: row.get(3),
            payment_type: row.get(4),
        })
        .collect();

        Ok((items, payments))
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get(&self, user_id: i64) -> Result<Option<MeliToken>, SyncError> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, expires_at
            FROM meli_tokens
            WHERE meli_user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let enc_access: String = row.get(0);
        let enc_refresh: String = row.get(1);

        Ok(Some(MeliToken {
            user_id,
            access_token: self.crypto.decrypt(&enc_access)?,
            refresh_token: self.crypto.decrypt(&enc_refresh)?,
            expires_at: row.get(2),
        }))
    }

    async fn save(&self, token: &MeliToken) -> Result<(), SyncError> {
        let enc_access = self.crypto.encrypt(&token.access_token)?;
        let enc_refresh = self.crypto.encrypt(&token.refresh_token)?;

        sqlx::query(
            r#"
            INSERT INTO meli_tokens (meli_user_id, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (meli_user_id)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(token.user_id)
        .bind(&enc_access)
        .bind(&enc_refresh)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn meli_user_from_row(row: &PgRow) -> MeliUser {
    MeliUser {
        id: row.get(0),
        created_at: row.get(1),
        user: LocalUser {
            id: row.get(2),
            username: row.get(3),
            email: row.get(4),
            first_name: row.get(5),
            last_name: row.get(6),
        },
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn get(&self, meli_user_id: i64) -> Result<Option<MeliUser>, SyncError> {
        let row = sqlx::query(
            r#"
            SELECT m.id, m.created_at, u.id, u.username, u.email, u.first_name, u.last_name
            FROM meli_users m
            JOIN auth_users u ON u.id = m.user_id
            WHERE m.id = $1
            "#,
        )
        .bind(meli_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(meli_user_from_row))
    }

    async fn create(&self, info: &MeliUserInfo) -> Result<MeliUser, SyncError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO auth_users (username, email, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&info.nickname)
        .bind(&info.email)
        .bind(&info.first_name)
        .bind(&info.last_name)
        .fetch_one(&mut *tx)
        .await?;
        let local_id: i64 = row.get(0);

        let row = sqlx::query(
            "INSERT INTO meli_users (id, user_id) VALUES ($1, $2) RETURNING created_at",
        )
        .bind(info.id)
        .bind(local_id)
        .fetch_one(&mut *tx)
        .await?;
        let created_at: DateTime<Utc> = row.get(0);

        tx.commit().await?;

        Ok(MeliUser {
            id: info.id,
            created_at,
            user: LocalUser {
                id: local_id,
                username: info.nickname.clone(),
                email: info.email.clone(),
                first_name: info.first_name.clone(),
                last_name: info.last_name.clone(),
            },
        })
    }
}

fn upsert_outcome(row: &PgRow) -> Upsert {
    let previous_status: Option<String> = row.get(0);
    match previous_status {
        None => Upsert::Created,
        Some(previous_status) => Upsert::Updated { previous_status },
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn save_or_update(
        &self,
        q: &QuestionUpsert,
        on_create: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError> {
        let mut tx = self.pool.begin().await?;

        // The CTE reads the row as it was before this statement.
        let row = sqlx::query(
            r#"
            WITH prev AS (SELECT status FROM questions WHERE id = $1)
            INSERT INTO questions
                (id, meli_user_id, item_id, text, status, date_created, from_user_id,
                 answer_text, answer_date_created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id)
            DO UPDATE SET
                meli_user_id = EXCLUDED.meli_user_id,
                item_id = EXCLUDED.item_id,
                text = EXCLUDED.text,
                status = EXCLUDED.status,
                date_created = EXCLUDED.date_created,
                from_user_id = EXCLUDED.from_user_id,
                answer_text = EXCLUDED.answer_text,
                answer_date_created = EXCLUDED.answer_date_created,
                updated_at = NOW()
            RETURNING (SELECT status FROM prev)
            "#,
        )
        .bind(q.id)
        .bind(q.meli_user_id)
        .bind(&q.item_id)
        .bind(&q.text)
        .bind(&q.status)
        .bind(q.date_created)
        .bind(q.from_user_id)
        .bind(&q.answer_text)
        .bind(q.answer_date_created)
        .fetch_one(&mut *tx)
        .await?;

        let outcome = upsert_outcome(&row);
        if let Some(n) = on_create.filter(|_| outcome.is_created()) {
            insert_notification(&mut *tx, n).await?;
        }
        tx.commit().await?;

        Ok(outcome)
    }

    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Question>, SyncError> {
        let rows = sqlx::query(
            r#"
            SELECT id, meli_user_id, item_id, text, status, date_created, from_user_id,
                   answer_text, answer_date_created, created_at, updated_at
            FROM questions
            WHERE meli_user_id = $1
            ORDER BY date_created DESC
            "#,
        )
        .bind(meli_user_id)
        .fetch_all(&self.pool)
        .await?;

        let questions = rows
            .iter()
            .map(|row| Question {
                id: row.get(0),
                meli_user_id: row.get(1),
                item_id: row.get(2),
                text: row.get(3),
                status: row.get(4),
                date_created: row.get(5),
                from_user_id: row.get(6),
                answer_text: row.get(7),
                answer_date_created: row.get(8),
                created_at: row.get(9),
                updated_at: row.get(10),
            })
            .collect();

        Ok(questions)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn save_or_update(
        &self,
        o: &OrderUpsert,
        on_status_change: Option<&NewNotification>,
    ) -> Result<Upsert, SyncError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            WITH prev AS (SELECT status FROM orders WHERE id = $1)
            INSERT INTO orders
                (id, meli_user_id, status, date_created, date_closed, last_updated,
                 buyer_id, buyer_nickname, buyer_email, buyer_phone, buyer_first_name,
                 buyer_last_name, total_amount, paid_amount, currency_id, shipping_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id)
            DO UPDATE SET
                meli_user_id = EXCLUDED.meli_user_id,
                status = EXCLUDED.status,
                date_created = EXCLUDED.date_created,
                date_closed = EXCLUDED.date_closed,
                last_updated = EXCLUDED.last_updated,
                buyer_id = EXCLUDED.buyer_id,
                buyer_nickname = EXCLUDED.buyer_nickname,
                buyer_email = EXCLUDED.buyer_email,
                buyer_phone = EXCLUDED.buyer_phone,
                buyer_first_name = EXCLUDED.buyer_first_name,
                buyer_last_name = EXCLUDED.buyer_last_name,
                total_amount = EXCLUDED.total_amount,
                paid_amount = EXCLUDED.paid_amount,
                currency_id = EXCLUDED.currency_id,
                shipping_id = EXCLUDED.shipping_id,
                updated_at = NOW()
            RETURNING (SELECT status FROM prev)
            "#,
        )
        .bind(o.id)
        .bind(o.meli_user_id)
        .bind(&o.status)
        .bind(o.date_created)
        .bind(o.date_closed)
        .bind(o.last_updated)
        .bind(o.buyer.id)
        .bind(&o.buyer.nickname)
        .bind(&o.buyer.email)
        .bind(&o.buyer.phone)
        .bind(&o.buyer.first_name)
        .bind(&o.buyer.last_name)
        .bind(o.total_amount)
        .bind(o.paid_amount)
        .bind(&o.currency_id)
        .bind(o.shipping_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_order_lines(&mut tx, o).await?;

        let outcome = upsert_outcome(&row);
        if let Some(n) = on_status_change.filter(|_| outcome.status_changed(&o.status)) {
            insert_notification(&mut *tx, n).await?;
        }
        tx.commit().await?;

        Ok(outcome)
    }

    async fn get_by_user(&self, meli_user_id: i64) -> Result<Vec<Order>, SyncError> {
        let rows = sqlx::query(
            r#"
            SELECT id, meli_user_id, status, date_created, date_closed, last_updated,
                   buyer_id, buyer_nickname, buyer_email, buyer_phone, buyer_first_name,
                   buyer_last_name, total_amount, paid_amount, currency_id, shipping_id,
                   created_at, updated_at
            FROM orders
            WHERE meli_user_id = $1
            ORDER BY date_created DESC
            "#,
        )
        .bind(meli_user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get(0);
            let (items, payments) = self.order_lines(id).await?;
            orders.push(Order {
                id,
                meli_user_id: row.get(1),
                status: row.get(2),
                date_created: row.get(3),
                date_closed: row.get(4),
                last_updated: row.get(5),
                buyer: Buyer {
                    id: row.get(6),
                    nickname: row.get(7),
                    email: row.get(8),
                    phone: row.get(9),
                    first_name: row.get(10),
                    last_name: row.get(11),
                },
                total_amount: row.get(12),
                paid_amount: row.get(13),
                currency_id: row.get(14),
                shipping_id: row.get(15),
                items,
                payments,
                created_at: row.get(16),
                updated_at: row.get(17),
            });
        }

        Ok(orders)
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification, SyncError> {
    let kind: String = row.get(2);
    Ok(Notification {
        id: row.get(0),
        meli_user_id: row.get(1),
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| SyncError::Database(format!("unknown notification kind {kind}")))?,
        title: row.get(3),
        message: row.get(4),
        question_id: row.get(5),
        order_id: row.get(6),
        status_change: row.get(7),
        created_at: row.get(8),
        read_at: row.get(9),
    })
}

const NOTIFICATION_COLUMNS: &str = "id, meli_user_id, kind, title, message, question_id, \
                                    order_id, status_change, created_at, read_at";

async fn insert_notification<'e, E>(
    executor: E,
    n: &NewNotification,
) -> Result<Notification, SyncError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO notifications
            (meli_user_id, kind, title, message, question_id, order_id, status_change)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {NOTIFICATION_COLUMNS}
        "#
    ))
    .bind(n.meli_user_id)
    .bind(n.kind.as_str())
    .bind(&n.title)
    .bind(&n.message)
    .bind(n.question_id)
    .bind(n.order_id)
    .bind(&n.status_change)
    .fetch_one(executor)
    .await?;

    notification_from_row(&row)
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn save(&self, n: &NewNotification) -> Result<Notification, SyncError> {
        insert_notification(&self.pool, n).await
    }

    async fn get_by_user(
        &self,
        meli_user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, SyncError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE meli_user_id = $1 AND ($2 = false OR read_at IS NULL)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(meli_user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_as_read(
        &self,
        meli_user_id: i64,
        notification_id: i64,
    ) -> Result<Notification, SyncError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND meli_user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification_id)
        .bind(meli_user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => notification_from_row(&row),
            None => Err(SyncError::NotFound("notification".into())),
        }
    }
}
