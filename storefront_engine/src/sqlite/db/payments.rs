use log::debug;
use sqlx::SqliteConnection;
use storefront_common::CryptoAmount;

use crate::{
    db_types::{Payment, PaymentStatus},
    traits::StorefrontError,
};

pub async fn fetch_payment(tx_hash: &str, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE tx_hash = $1").bind(tx_hash).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payments_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Appends a payment fact. Payments are never deleted: a `Failed` row permanently burns its hash against replay,
/// and a `Pending` row may later progress to `Confirmed` via [`update_payment`].
#[allow(clippy::too_many_arguments)]
pub async fn insert_payment(
    order_id: Option<i64>,
    subscription_id: Option<i64>,
    tx_hash: &str,
    amount: CryptoAmount,
    currency: &str,
    status: PaymentStatus,
    confirmations: i64,
    conn: &mut SqliteConnection,
) -> Result<Payment, StorefrontError> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, subscription_id, tx_hash, amount, currency, status, confirmations)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(subscription_id)
    .bind(tx_hash)
    .bind(amount)
    .bind(currency)
    .bind(status)
    .bind(confirmations)
    .fetch_one(conn)
    .await?;
    debug!("💳️ Payment [{tx_hash}] recorded as {status} ({confirmations} confirmations)");
    Ok(payment)
}

/// Progresses an existing payment row's status/amount/confirmations in place.
pub async fn update_payment(
    tx_hash: &str,
    amount: CryptoAmount,
    status: PaymentStatus,
    confirmations: i64,
    conn: &mut SqliteConnection,
) -> Result<Payment, StorefrontError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments
            SET amount = $1, status = $2, confirmations = $3, updated_at = CURRENT_TIMESTAMP
            WHERE tx_hash = $4
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(status)
    .bind(confirmations)
    .bind(tx_hash)
    .fetch_optional(conn)
    .await?;
    payment.ok_or_else(|| StorefrontError::PaymentNotFound(tx_hash.to_string()))
}
