use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;
use storefront_common::CryptoAmount;

use crate::{
    db_types::{Chain, Invoice, InvoiceStatus, InvoiceTarget},
    traits::StorefrontError,
};

/// Returns the most recent `Pending` invoice for the order, if any. Expiry is judged by the caller against a single
/// `now` captured once per flow, so that one request never sees an invoice as both live and expired.
pub async fn pending_invoice_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        "SELECT * FROM invoices WHERE order_id = $1 AND status = 'Pending' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

/// The subscription counterpart of [`pending_invoice_for_order`].
pub async fn pending_invoice_for_subscription(
    subscription_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        "SELECT * FROM invoices WHERE subscription_id = $1 AND status = 'Pending' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

/// Returns the most recent non-expired invoice bound to the address, regardless of target. This backs the
/// address anti-reuse invariant: it is enforced at verification time, not only at creation time, because addresses
/// are deterministically derived and could theoretically repeat.
pub async fn live_invoice_for_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        "SELECT * FROM invoices WHERE address = $1 AND status != 'Expired' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(address)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

/// Claims the next HD derivation index for the chain. Runs inside the caller's transaction so two concurrent
/// invoice issuances can never share an index.
pub async fn next_derivation_index(chain: Chain, conn: &mut SqliteConnection) -> Result<i64, StorefrontError> {
    let (index,): (i64,) = sqlx::query_as(
        r#"
            INSERT INTO hd_indices (chain, next_index) VALUES ($1, 1)
            ON CONFLICT (chain) DO UPDATE SET next_index = next_index + 1
            RETURNING next_index - 1;
        "#,
    )
    .bind(chain)
    .fetch_one(conn)
    .await?;
    trace!("🧾️ Claimed derivation index {index} for {chain}");
    Ok(index)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_invoice(
    target: InvoiceTarget,
    chain: Chain,
    address: &str,
    crypto_amount: CryptoAmount,
    derivation_index: i64,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, StorefrontError> {
    let (order_id, subscription_id) = match target {
        InvoiceTarget::Order(id) => (Some(id), None),
        InvoiceTarget::Subscription(id) => (None, Some(id)),
    };
    let invoice: Invoice = sqlx::query_as(
        r#"
            INSERT INTO invoices (order_id, subscription_id, chain, address, crypto_amount, derivation_index, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(subscription_id)
    .bind(chain)
    .bind(address)
    .bind(crypto_amount)
    .bind(derivation_index)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Invoice #{} issued for {target}: {crypto_amount} {chain} to {address}", invoice.id);
    Ok(invoice)
}

pub async fn update_invoice_status(
    invoice_id: i64,
    status: InvoiceStatus,
    conn: &mut SqliteConnection,
) -> Result<(), StorefrontError> {
    sqlx::query("UPDATE invoices SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(status)
        .bind(invoice_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Marks all `Pending` invoices overdue at `now` as `Expired`, returning the affected rows. `unixepoch` normalises
/// the mix of RFC3339 (bound timestamps) and `CURRENT_TIMESTAMP` formats SQLite stores.
pub(crate) async fn expire_overdue(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Invoice>, StorefrontError> {
    let rows = sqlx::query_as(
        "UPDATE invoices SET status = 'Expired', updated_at = CURRENT_TIMESTAMP WHERE status = 'Pending' AND \
         unixepoch(expires_at) < unixepoch($1) RETURNING *;",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
