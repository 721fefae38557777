//! Mapping of MercadoLibre payloads onto stored records.

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::meli::{MeliOrder, MeliQuestion};
use crate::store::{Buyer, OrderItem, OrderUpsert, Payment, QuestionUpsert};

/// Parse an ISO 8601 timestamp with `Z` or a numeric offset.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Provider(format!("invalid timestamp {value:?}: {e}")))
}

pub fn question_upsert(meli_user_id: i64, q: MeliQuestion) -> Result<QuestionUpsert, SyncError> {
    let (answer_text, answer_date_created) = match q.answer {
        Some(answer) => (
            Some(answer.text),
            Some(parse_datetime(&answer.date_created)?),
        ),
        None => (None, None),
    };

    Ok(QuestionUpsert {
        id: q.id,
        meli_user_id,
        date_created: parse_datetime(&q.date_created)?,
        item_id: q.item_id,
        text: q.text,
        status: q.status,
        from_user_id: q.from.id,
        answer_text,
        answer_date_created,
    })
}

pub fn order_upsert(meli_user_id: i64, o: MeliOrder) -> Result<OrderUpsert, SyncError> {
    let date_closed = o.date_closed.as_deref().map(parse_datetime).transpose()?;

    Ok(OrderUpsert {
        id: o.id,
        meli_user_id,
        date_created: parse_datetime(&o.date_created)?,
        date_closed,
        last_updated: parse_datetime(&o.last_updated)?,
        buyer: Buyer {
            id: o.buyer.id,
            phone: o.buyer.phone.as_ref().and_then(|p| p.display()),
            nickname: o.buyer.nickname,
            email: o.buyer.email,
            first_name: o.buyer.first_name,
            last_name: o.buyer.last_name,
        },
        status: o.status,
        total_amount: o.total_amount,
        paid_amount: o.paid_amount,
        currency_id: o.currency_id,
        shipping_id: o.shipping.and_then(|s| s.id),
        items: o
            .order_items
            .into_iter()
            .map(|line| OrderItem {
                item_id: line.item.id,
                title: line.item.title,
                quantity: line.quantity,
                unit_price: line.unit_price,
                currency_id: line.currency_id,
            })
            .collect(),
        payments: o
            .payments
            .into_iter()
            .map(|p| Payment {
                payment_id: p.id,
                transaction_amount: p.transaction_amount,
                currency_id: p.currency_id,
                status: p.status,
                payment_type: p.payment_type,
            })
            .collect(),
    })
}
