use std::fmt::Debug;

use chrono::Duration;
use log::*;
use storefront_common::UsdAmount;

use crate::{
    db_types::{Actor, Chain, Invoice, Role},
    traits::{ExchangeRates, StorefrontDatabase, StorefrontError, WalletAllocator},
};

/// The default invoice payment window.
pub fn default_invoice_ttl() -> Duration {
    Duration::hours(1)
}

/// `InvoiceApi` issues crypto-denominated invoices against USD-priced orders.
///
/// Each invoice gets a fresh deterministically-derived address (one HD index per invoice, claimed atomically) and a
/// crypto amount fixed at issuance time from the most recent stored exchange rate. No rate on record is a hard
/// failure: an invoice must never be issued at a guessed price.
pub struct InvoiceApi<B, W> {
    db: B,
    wallet: W,
}

impl<B, W> Debug for InvoiceApi<B, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceApi")
    }
}

impl<B, W> InvoiceApi<B, W> {
    pub fn new(db: B, wallet: W) -> Self {
        Self { db, wallet }
    }
}

impl<B, W> InvoiceApi<B, W>
where
    B: StorefrontDatabase + ExchangeRates,
    W: WalletAllocator + Sync,
{
    /// Issue (or re-fetch) the invoice for an order. Idempotent: while an unexpired invoice exists it is returned
    /// with `false` in the second slot, and no new address or index is consumed.
    ///
    /// Only the order's buyer (or an admin) may request an invoice.
    pub async fn issue_invoice(
        &self,
        actor: &Actor,
        order_id: i64,
        chain: Chain,
        xpub: &str,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError> {
        self.authorize(actor, order_id).await?;
        let rate = self.db.fetch_last_rate(chain).await?;
        let (invoice, fresh) = self.db.issue_invoice(order_id, chain, xpub, &self.wallet, &rate, ttl).await?;
        if fresh {
            info!(
                "🧾️ Invoice #{} issued for order #{order_id}: {} {chain} to {} (rate {rate})",
                invoice.id, invoice.crypto_amount, invoice.address
            );
        }
        Ok((invoice, fresh))
    }

    /// Issue (or re-fetch) an invoice billing a subscription. The subscription itself lives in an external billing
    /// system, which supplies the USD amount; only that system's service identity (an admin actor) may call this.
    pub async fn issue_subscription_invoice(
        &self,
        actor: &Actor,
        subscription_id: i64,
        amount: UsdAmount,
        chain: Chain,
        xpub: &str,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError> {
        if actor.role != Role::Admin {
            return Err(StorefrontError::Unauthorized(
                "Only the billing system may issue subscription invoices".to_string(),
            ));
        }
        let rate = self.db.fetch_last_rate(chain).await?;
        let (invoice, fresh) =
            self.db.issue_subscription_invoice(subscription_id, amount, chain, xpub, &self.wallet, &rate, ttl).await?;
        if fresh {
            info!(
                "🧾️ Invoice #{} issued for subscription #{subscription_id}: {} {chain} to {} (rate {rate})",
                invoice.id, invoice.crypto_amount, invoice.address
            );
        }
        Ok((invoice, fresh))
    }

    /// The order's current live invoice, if any.
    pub async fn active_invoice(&self, actor: &Actor, order_id: i64) -> Result<Option<Invoice>, StorefrontError> {
        self.authorize(actor, order_id).await?;
        self.db.fetch_active_invoice(order_id).await
    }

    async fn authorize(&self, actor: &Actor, order_id: i64) -> Result<(), StorefrontError> {
        if actor.role == Role::Admin {
            return Ok(());
        }
        let order = self.db.fetch_order(order_id).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        if order.buyer_id == actor.id {
            Ok(())
        } else {
            Err(StorefrontError::Unauthorized(format!("[{}] may not manage invoices for order #{order_id}", actor.id)))
        }
    }
}
