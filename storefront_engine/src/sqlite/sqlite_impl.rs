//! `SqliteDatabase` is a concrete implementation of a storefront engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
//!
//! SQLite has no `SELECT ... FOR UPDATE`, but it does not need one: a write transaction holds the database write
//! lock for its entire lifetime, so every flow here opens one transaction up front, re-reads the rows it is about
//! to mutate inside it, and commits (or rolls back) as a unit. That gives the same isolation a row-locking backend
//! would provide.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::{Sqlite, SqlitePool, Transaction};
use storefront_common::{CryptoAmount, UsdAmount};

use super::db::{db_url, exchange_rates, invoices, new_pool, orders, payments, products, shops};
use crate::{
    api::objects::{PaymentClaim, VerifyDisposition, VerifyOutcome},
    db_types::{
        Chain,
        ExchangeRate,
        Invoice,
        InvoiceStatus,
        InvoiceTarget,
        NewOrder,
        Order,
        OrderItem,
        OrderStatusType,
        OrderWithItems,
        Payment,
        PaymentStatus,
        Product,
        Shop,
    },
    helpers::{self, CartLine},
    status::{validate_transition, Transition},
    traits::{
        BlockchainVerifier,
        ChainTxStatus,
        ExchangeRateError,
        ExchangeRates,
        StorefrontDatabase,
        StorefrontError,
        VerifierError,
        VerifyRequest,
        WalletAllocator,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let shop = shops::fetch_shop(shop_id, &mut conn).await?;
        Ok(shop)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn create_order(&self, order: NewOrder, cart: &[CartLine]) -> Result<OrderWithItems, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let priced = products::check_cart(cart, &mut tx).await?;
        let shop =
            shops::fetch_shop(priced.shop_id, &mut tx).await?.ok_or(StorefrontError::ShopNotFound(priced.shop_id))?;
        if !shop.is_active {
            return Err(StorefrontError::Validation(format!("Shop '{}' is not accepting orders", shop.name)));
        }
        let (order, items) = orders::insert_order(order, &priced, &shop.currency, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{} has been saved in the DB with {} items", order.id, items.len());
        Ok(OrderWithItems { order, items })
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, query: crate::api::objects::OrderQueryFilter) -> Result<Vec<Order>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn transition_order(&self, order_id: i64, new_status: OrderStatusType) -> Result<Order, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        let from = order.status;
        match validate_transition(from, new_status) {
            None => Err(StorefrontError::InvalidTransition { from, to: new_status }),
            Some(Transition::NoOp) => {
                debug!("🗃️ Order #{order_id} is already {from}; nothing to do");
                Ok(order)
            },
            Some(Transition::Apply) => {
                // Confirmation reserves stock no matter which path it arrives by, and cancellation of a confirmed
                // order hands it back. Deduction filters on the item snapshot's preorder flag, same as the return
                // path, so a product flag edited mid-order cannot desynchronise the two.
                if from == OrderStatusType::Pending && new_status == OrderStatusType::Confirmed {
                    let items = orders::fetch_order_items(order_id, &mut tx).await?;
                    let cart: Vec<CartLine> = items.iter().map(|i| CartLine::new(i.product_id, i.quantity)).collect();
                    products::check_cart(&cart, &mut tx).await?;
                    for item in items.iter().filter(|i| !i.is_preorder) {
                        products::adjust_stock(item.product_id, -item.quantity, &mut tx).await?;
                    }
                }
                let updated = orders::update_order_status(order_id, new_status, &mut tx).await?;
                if from == OrderStatusType::Confirmed && new_status == OrderStatusType::Cancelled {
                    orders::return_stock_for_order(order_id, &mut tx).await?;
                }
                tx.commit().await?;
                info!("🗃️ Order #{order_id} moved from {from} to {new_status}");
                Ok(updated)
            },
        }
    }

    async fn fetch_active_invoice(&self, order_id: i64) -> Result<Option<Invoice>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::pending_invoice_for_order(order_id, &mut conn).await?;
        Ok(invoice.filter(|inv| !inv.is_expired(Utc::now())))
    }

    async fn issue_invoice<W: WalletAllocator + Sync>(
        &self,
        order_id: i64,
        chain: Chain,
        xpub: &str,
        wallet: &W,
        rate: &ExchangeRate,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        if order.status != OrderStatusType::Pending {
            return Err(StorefrontError::OrderNotPending(order.status));
        }
        if let Some(existing) = invoices::pending_invoice_for_order(order_id, &mut tx).await? {
            if !existing.is_expired(now) {
                debug!("🧾️ Order #{order_id} already has live invoice #{}; returning it", existing.id);
                return Ok((existing, false));
            }
            // Overdue but not yet swept. Retire it and fall through to a fresh one.
            invoices::update_invoice_status(existing.id, InvoiceStatus::Expired, &mut tx).await?;
        }
        let amount = rate.convert_to_crypto(order.total_price)?;
        let invoice = mint_invoice(InvoiceTarget::Order(order_id), chain, xpub, wallet, amount, now + ttl, &mut tx).await?;
        tx.commit().await?;
        Ok((invoice, true))
    }

    async fn issue_subscription_invoice<W: WalletAllocator + Sync>(
        &self,
        subscription_id: i64,
        amount: UsdAmount,
        chain: Chain,
        xpub: &str,
        wallet: &W,
        rate: &ExchangeRate,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = invoices::pending_invoice_for_subscription(subscription_id, &mut tx).await? {
            if !existing.is_expired(now) {
                debug!("🧾️ Subscription #{subscription_id} already has live invoice #{}; returning it", existing.id);
                return Ok((existing, false));
            }
            invoices::update_invoice_status(existing.id, InvoiceStatus::Expired, &mut tx).await?;
        }
        let crypto = rate.convert_to_crypto(amount)?;
        let invoice =
            mint_invoice(InvoiceTarget::Subscription(subscription_id), chain, xpub, wallet, crypto, now + ttl, &mut tx)
                .await?;
        tx.commit().await?;
        Ok((invoice, true))
    }

    async fn fetch_payment(&self, tx_hash: &str) -> Result<Option<Payment>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(tx_hash, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let rows = payments::fetch_payments_for_order(order_id, &mut conn).await?;
        Ok(rows)
    }

    async fn verify_payment<V: BlockchainVerifier + Sync>(
        &self,
        claim: &PaymentClaim,
        verifier: &V,
        tolerance: Option<f64>,
    ) -> Result<VerifyOutcome, StorefrontError> {
        let tx_hash = claim
            .proof
            .resolve()
            .ok_or_else(|| StorefrontError::Validation("The payment proof does not contain a valid transaction hash".to_string()))?;
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(claim.order_id, &mut tx)
            .await?
            .ok_or(StorefrontError::OrderNotFound(claim.order_id))?;
        if order.buyer_id != claim.buyer_id {
            warn!("🔐️ Buyer [{}] submitted a payment for order #{} belonging to someone else", claim.buyer_id, order.id);
            return Err(StorefrontError::Unauthorized("Only the order's buyer may submit payment for it".to_string()));
        }
        // Hash checks run before any blockchain call, while the write lock is held, or two callers racing the same
        // hash could both pass.
        let existing = payments::fetch_payment(&tx_hash, &mut tx).await?;
        if let Some(p) = &existing {
            if p.order_id != Some(order.id) {
                warn!("💳️ Transaction [{tx_hash}] resubmitted against order #{}, but it belongs elsewhere", order.id);
                return Err(StorefrontError::TxAlreadyUsed(tx_hash));
            }
            match p.status {
                PaymentStatus::Confirmed => {
                    debug!("💳️ Transaction [{tx_hash}] already confirmed order #{}; idempotent replay", order.id);
                    return Ok(VerifyOutcome {
                        order,
                        payment: p.clone(),
                        disposition: VerifyDisposition::AlreadyConfirmed,
                    });
                },
                PaymentStatus::Failed => {
                    return Err(StorefrontError::PaymentNotVerified {
                        code: None,
                        reason: format!("Transaction {tx_hash} was previously rejected and may not be retried"),
                    });
                },
                PaymentStatus::Pending => {},
            }
        }
        if order.status != OrderStatusType::Pending {
            return Err(StorefrontError::OrderNotPending(order.status));
        }
        self.settle_claim(tx, order, &tx_hash, existing, claim.currency_hint, verifier, tolerance).await
    }

    async fn check_payment_status<V: BlockchainVerifier + Sync>(
        &self,
        order_id: i64,
        tx_hash: &str,
        verifier: &V,
        tolerance: Option<f64>,
    ) -> Result<VerifyOutcome, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        let payment = payments::fetch_payment(tx_hash, &mut tx)
            .await?
            .ok_or_else(|| StorefrontError::PaymentNotFound(tx_hash.to_string()))?;
        if payment.order_id != Some(order.id) {
            return Err(StorefrontError::TxAlreadyUsed(tx_hash.to_string()));
        }
        match payment.status {
            PaymentStatus::Confirmed => {
                return Ok(VerifyOutcome { order, payment, disposition: VerifyDisposition::AlreadyConfirmed });
            },
            PaymentStatus::Failed => {
                return Err(StorefrontError::PaymentNotVerified {
                    code: None,
                    reason: format!("Transaction {tx_hash} was previously rejected and may not be retried"),
                });
            },
            PaymentStatus::Pending => {},
        }
        if order.status != OrderStatusType::Pending {
            return Err(StorefrontError::OrderNotPending(order.status));
        }
        let hint = payment.currency.parse::<Chain>().ok();
        self.settle_claim(tx, order, tx_hash, Some(payment), hint, verifier, tolerance).await
    }

    async fn expire_stale_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let expired = invoices::expire_overdue(now, &mut tx).await?;
        let mut cancelled = Vec::new();
        for invoice in &expired {
            let Some(order_id) = invoice.order_id else {
                trace!("🕰️ Subscription invoice #{} expired", invoice.id);
                continue;
            };
            let order = orders::fetch_order(order_id, &mut tx).await?;
            match order {
                Some(order) if order.status == OrderStatusType::Pending => {
                    let order = orders::update_order_status(order.id, OrderStatusType::Cancelled, &mut tx).await?;
                    info!("🕰️ Invoice #{} expired; order #{} cancelled", invoice.id, order.id);
                    cancelled.push(order);
                },
                Some(_) | None => {
                    trace!("🕰️ Invoice #{} expired; its order needed no action", invoice.id);
                },
            }
        }
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn close(&mut self) -> Result<(), StorefrontError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The back half of the verification flow: target resolution, the verifier call, tolerance, expiry, and
    /// settlement. Takes ownership of the open transaction; commits on every path that persists a fact, drops the
    /// transaction (rolling back) on every path that must leave no trace.
    async fn settle_claim<V: BlockchainVerifier + Sync>(
        &self,
        mut tx: Transaction<'static, Sqlite>,
        order: Order,
        tx_hash: &str,
        existing: Option<Payment>,
        currency_hint: Option<Chain>,
        verifier: &V,
        tolerance: Option<f64>,
    ) -> Result<VerifyOutcome, StorefrontError> {
        let now = Utc::now();
        // Target resolution: an invoice (even an overdue one; expiry is judged after the chain lookup) pins the
        // address, amount and chain. Without one we fall back to the shop wallet and the claim's currency hint.
        let invoice = invoices::pending_invoice_for_order(order.id, &mut tx).await?;
        let (address, expected, chain) = match &invoice {
            Some(inv) => (inv.address.clone(), inv.crypto_amount, inv.chain),
            None => {
                let shop =
                    shops::fetch_shop(order.shop_id, &mut tx).await?.ok_or(StorefrontError::ShopNotFound(order.shop_id))?;
                let address = shop.wallet_address.ok_or_else(|| {
                    StorefrontError::Validation(format!(
                        "Order #{} has no invoice and shop '{}' has no wallet address to verify against",
                        order.id, shop.name
                    ))
                })?;
                let chain = currency_hint.ok_or_else(|| {
                    StorefrontError::Validation(
                        "A currency hint is required when paying an order with no invoice".to_string(),
                    )
                })?;
                let rate = exchange_rates::fetch_last_rate(chain, &mut tx).await?;
                let expected = rate.convert_to_crypto(order.total_price)?;
                (address, expected, chain)
            },
        };
        if let Some(live) = invoices::live_invoice_for_address(&address, &mut tx).await? {
            if !live.is_for(InvoiceTarget::Order(order.id)) {
                warn!("🧾️ Address {address} is bound to another live invoice; refusing to credit order #{}", order.id);
                return Err(StorefrontError::InvoiceReuse(address));
            }
        }
        let request =
            VerifyRequest { tx_hash: tx_hash.to_string(), address: address.clone(), expected, chain };
        let outcome = match verifier.verify_incoming(&request).await {
            Ok(outcome) => outcome,
            Err(VerifierError::Rejected { code, reason }) => {
                // The hash is burned: persist the failure and commit before surfacing the error.
                warn!("💳️ Verifier rejected [{tx_hash}] for order #{}: {reason}", order.id);
                upsert_payment(
                    existing.as_ref(),
                    order.id,
                    tx_hash,
                    CryptoAmount::default(),
                    chain,
                    PaymentStatus::Failed,
                    0,
                    &mut tx,
                )
                .await?;
                tx.commit().await?;
                return Err(StorefrontError::PaymentNotVerified { code: Some(code), reason });
            },
            Err(VerifierError::Transient(msg)) => {
                debug!("💳️ Verifier unavailable for [{tx_hash}]; leaving the hash retryable: {msg}");
                return Err(StorefrontError::Transient(msg));
            },
        };
        if !helpers::matches(outcome.amount, expected, tolerance) {
            debug!(
                "💳️ Transaction [{tx_hash}] transferred {} against an expected {expected}; outside tolerance",
                outcome.amount
            );
            return Err(StorefrontError::AmountMismatch { expected, received: outcome.amount });
        }
        if let Some(inv) = invoice.as_ref().filter(|inv| inv.is_expired(now)) {
            invoices::update_invoice_status(inv.id, InvoiceStatus::Expired, &mut tx).await?;
            upsert_payment(
                existing.as_ref(),
                order.id,
                tx_hash,
                outcome.amount,
                chain,
                PaymentStatus::Pending,
                outcome.confirmations,
                &mut tx,
            )
            .await?;
            orders::update_order_status(order.id, OrderStatusType::Cancelled, &mut tx).await?;
            tx.commit().await?;
            warn!("🕰️ Payment [{tx_hash}] arrived after invoice #{} expired; order #{} cancelled", inv.id, order.id);
            return Err(StorefrontError::InvoiceExpired(order.id));
        }
        match outcome.status {
            ChainTxStatus::Confirmed => {
                self.settle_confirmed(tx, order, tx_hash, existing, invoice, chain, outcome.amount, outcome.confirmations)
                    .await
            },
            ChainTxStatus::Pending => {
                let payment = upsert_payment(
                    existing.as_ref(),
                    order.id,
                    tx_hash,
                    outcome.amount,
                    chain,
                    PaymentStatus::Pending,
                    outcome.confirmations,
                    &mut tx,
                )
                .await?;
                tx.commit().await?;
                debug!(
                    "💳️ Transaction [{tx_hash}] found with {} confirmations; order #{} stays Pending",
                    outcome.confirmations, order.id
                );
                Ok(VerifyOutcome { order, payment, disposition: VerifyDisposition::AwaitingConfirmations })
            },
        }
    }

    /// The confirmation step: re-runs the stock gate against the order's item snapshots and, in the same
    /// transaction, either deducts stock and confirms everything, or cancels the order with the payment on record.
    #[allow(clippy::too_many_arguments)]
    async fn settle_confirmed(
        &self,
        mut tx: Transaction<'static, Sqlite>,
        order: Order,
        tx_hash: &str,
        existing: Option<Payment>,
        invoice: Option<Invoice>,
        chain: Chain,
        amount: CryptoAmount,
        confirmations: i64,
    ) -> Result<VerifyOutcome, StorefrontError> {
        let items = orders::fetch_order_items(order.id, &mut tx).await?;
        let cart: Vec<CartLine> = items.iter().map(|i| CartLine::new(i.product_id, i.quantity)).collect();
        match products::check_cart(&cart, &mut tx).await {
            Ok(_) => {
                // deduct per the item snapshot's preorder flag, mirroring the return path on cancellation
                for item in items.iter().filter(|i| !i.is_preorder) {
                    products::adjust_stock(item.product_id, -item.quantity, &mut tx).await?;
                }
                let payment = upsert_payment(
                    existing.as_ref(),
                    order.id,
                    tx_hash,
                    amount,
                    chain,
                    PaymentStatus::Confirmed,
                    confirmations,
                    &mut tx,
                )
                .await?;
                if let Some(inv) = &invoice {
                    invoices::update_invoice_status(inv.id, InvoiceStatus::Paid, &mut tx).await?;
                }
                let order = orders::update_order_status(order.id, OrderStatusType::Confirmed, &mut tx).await?;
                tx.commit().await?;
                info!("🚀️ Order #{} confirmed by transaction [{tx_hash}]; stock deducted", order.id);
                Ok(VerifyOutcome { order, payment, disposition: VerifyDisposition::Confirmed })
            },
            Err(
                gate_error @ (StorefrontError::ProductsNotFound(_) |
                StorefrontError::ProductUnavailable(_) |
                StorefrontError::StockInsufficient { .. }),
            ) => {
                // Stock was raced away (or the product withdrawn) between order creation and payment confirmation.
                // The money is real, so the payment stays on record while the order is cancelled.
                upsert_payment(
                    existing.as_ref(),
                    order.id,
                    tx_hash,
                    amount,
                    chain,
                    PaymentStatus::Pending,
                    confirmations,
                    &mut tx,
                )
                .await?;
                if let Some(inv) = &invoice {
                    invoices::update_invoice_status(inv.id, InvoiceStatus::Expired, &mut tx).await?;
                }
                orders::update_order_status(order.id, OrderStatusType::Cancelled, &mut tx).await?;
                tx.commit().await?;
                warn!("🛒️ Order #{} cancelled at confirmation time: {gate_error}", order.id);
                match gate_error {
                    StorefrontError::ProductsNotFound(ids) => {
                        Err(StorefrontError::ProductUnavailable(ids.first().copied().unwrap_or_default()))
                    },
                    e => Err(e),
                }
            },
            Err(e) => Err(e),
        }
    }
}

/// Inserts the payment row, or progresses the existing one for the same hash.
#[allow(clippy::too_many_arguments)]
async fn upsert_payment(
    existing: Option<&Payment>,
    order_id: i64,
    tx_hash: &str,
    amount: CryptoAmount,
    chain: Chain,
    status: PaymentStatus,
    confirmations: i64,
    conn: &mut sqlx::SqliteConnection,
) -> Result<Payment, StorefrontError> {
    match existing {
        Some(_) => payments::update_payment(tx_hash, amount, status, confirmations, conn).await,
        None => {
            payments::insert_payment(Some(order_id), None, tx_hash, amount, chain.symbol(), status, confirmations, conn)
                .await
        },
    }
}

/// Claims the next HD index for the chain, derives the address, enforces the address anti-reuse invariant for the
/// target, and inserts the invoice row. Runs inside the caller's transaction.
async fn mint_invoice<W: WalletAllocator + Sync>(
    target: InvoiceTarget,
    chain: Chain,
    xpub: &str,
    wallet: &W,
    amount: CryptoAmount,
    expires_at: DateTime<Utc>,
    conn: &mut sqlx::SqliteConnection,
) -> Result<Invoice, StorefrontError> {
    let index = invoices::next_derivation_index(chain, conn).await?;
    let index_u32 =
        u32::try_from(index).map_err(|_| StorefrontError::Conversion(format!("Derivation index {index} overflows u32")))?;
    let derived = wallet.generate_address(chain, xpub, index_u32)?;
    if let Some(live) = invoices::live_invoice_for_address(&derived.address, conn).await? {
        if !live.is_for(target) {
            return Err(StorefrontError::InvoiceReuse(derived.address));
        }
    }
    invoices::insert_invoice(target, chain, &derived.address, amount, index, expires_at, conn).await
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_last_rate(&self, chain: Chain) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::fetch_last_rate(chain, &mut conn).await
    }

    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::set_exchange_rate(rate, &mut conn).await
    }
}
