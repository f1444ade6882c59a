use chrono::{DateTime, Duration, Utc};
use storefront_common::{CryptoAmount, UsdAmount};
use thiserror::Error;

use crate::{
    api::objects::{OrderQueryFilter, PaymentClaim, VerifyOutcome},
    db_types::{
        Chain,
        ConversionError,
        ExchangeRate,
        Invoice,
        NewOrder,
        Order,
        OrderItem,
        OrderStatusType,
        OrderWithItems,
        Payment,
        Product,
        Shop,
    },
    helpers::{CartError, CartLine},
    traits::{BlockchainVerifier, WalletAllocator},
};

/// The contract a storage backend implements for the order & payment consistency engine.
///
/// Every mutating method is atomic: it either fully commits or fully rolls back, and any stock or status it touches
/// is re-read inside its own transaction before mutation. The backend is the *only* shared mutable resource in the
/// system — callers never cache stock, order status or payment status across requests.
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, StorefrontError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StorefrontError>;

    /// Takes a normalised cart and, in a single atomic transaction: re-reads and validates every referenced product
    /// (existence, active flag, stock for non-preorder lines, single-shop/single-currency), snapshots unit prices
    /// into item rows, computes the total and inserts the order with `Pending` status.
    ///
    /// Stock is **not** decremented here. Reservation is deferred to payment confirmation so that unpaid orders
    /// never hold inventory hostage.
    async fn create_order(&self, order: NewOrder, cart: &[CartLine]) -> Result<OrderWithItems, StorefrontError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StorefrontError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StorefrontError>;

    /// Fetches orders according to the criteria in the `OrderQueryFilter`, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorefrontError>;

    /// Applies the status state machine to the order, atomically.
    ///
    /// Re-applying the current status is an idempotent no-op and returns the unchanged order. Stock moves with the
    /// status: `Pending → Confirmed` re-runs the stock gate on the item snapshots and deducts per line (failing the
    /// whole transition if stock is gone), and `Confirmed → Cancelled` returns stock the same way. Lines whose
    /// product has since been deleted are logged and skipped on return; a deleted product cannot receive stock back.
    async fn transition_order(&self, order_id: i64, new_status: OrderStatusType) -> Result<Order, StorefrontError>;

    /// Returns the order's current non-expired `Pending` invoice, if any.
    async fn fetch_active_invoice(&self, order_id: i64) -> Result<Option<Invoice>, StorefrontError>;

    /// Issues an invoice for the order, idempotently: when an unexpired invoice already exists it is returned
    /// unchanged with `false` in the second slot. Otherwise the next HD derivation index for the chain is claimed,
    /// a fresh address derived, and an invoice persisted with `expires_at = now + ttl`. All under one transaction.
    async fn issue_invoice<W: WalletAllocator + Sync>(
        &self,
        order_id: i64,
        chain: Chain,
        xpub: &str,
        wallet: &W,
        rate: &ExchangeRate,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError>;

    /// The subscription counterpart of [`Self::issue_invoice`]. Subscriptions are opaque ids owned by an external
    /// billing system, so the USD amount to bill comes from the caller instead of an order total; everything else
    /// (idempotency, HD index allocation, address anti-reuse) behaves identically.
    async fn issue_subscription_invoice<W: WalletAllocator + Sync>(
        &self,
        subscription_id: i64,
        amount: UsdAmount,
        chain: Chain,
        xpub: &str,
        wallet: &W,
        rate: &ExchangeRate,
        ttl: Duration,
    ) -> Result<(Invoice, bool), StorefrontError>;

    async fn fetch_payment(&self, tx_hash: &str) -> Result<Option<Payment>, StorefrontError>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StorefrontError>;

    /// The payment verification flow (the correctness-critical path), all under one transaction:
    ///
    /// 1. Load the order; absent → `OrderNotFound`; wrong buyer → `Unauthorized`; non-`Pending` status → rejected
    ///    unless the hash already has a payment row for *this* order (idempotent replay).
    /// 2. Check the payment table for the hash. A row bound to a *different* order → `TxAlreadyUsed`. This check
    ///    runs before any blockchain call, or two callers racing the same hash could both pass.
    /// 3. Resolve the target address and expected amount, preferring an active invoice over the shop wallet.
    /// 4. Reject if the address is bound to a different order's live invoice (`InvoiceReuse`).
    /// 5. Call the verifier. A rejection persists a `Failed` payment row (the hash is burned) and the transaction
    ///    *commits*; a transient verifier error rolls back and leaves the hash retryable.
    /// 6. Apply the tolerance evaluator; a mismatch rolls back with `AmountMismatch` (the hash is *not* burned).
    /// 7. An expired invoice cancels the order, records the payment, and commits (`InvoiceExpired`).
    /// 8. A confirmed chain status re-runs the stock gate; failure cancels the order with the payment recorded
    ///    (`ProductUnavailable` / `StockInsufficient`); success deducts stock per line, confirms the order and the
    ///    payment, and marks the invoice `Paid` — inseparably.
    /// 9. An unconfirmed chain status records a `Pending` payment and leaves order and stock untouched.
    async fn verify_payment<V: BlockchainVerifier + Sync>(
        &self,
        claim: &PaymentClaim,
        verifier: &V,
        tolerance: Option<f64>,
    ) -> Result<VerifyOutcome, StorefrontError>;

    /// The read-submission-free polling variant: repeats steps 5–9 of [`Self::verify_payment`] for an existing
    /// payment row, without re-deriving the invoice, so a client can pick up new confirmations without
    /// resubmitting the hash.
    async fn check_payment_status<V: BlockchainVerifier + Sync>(
        &self,
        order_id: i64,
        tx_hash: &str,
        verifier: &V,
        tolerance: Option<f64>,
    ) -> Result<VerifyOutcome, StorefrontError>;

    /// Marks every `Pending` invoice past its expiry as `Expired` and cancels its order if the order is still
    /// `Pending`. Returns the cancelled orders.
    async fn expire_stale_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StorefrontError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorefrontError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorefrontError {
    #[error("Internal database error: {0}")]
    Database(String),
    #[error("Transient storage conflict, safe to retry: {0}")]
    Transient(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Shop {0} does not exist")]
    ShopNotFound(i64),
    #[error("Products not found: {0:?}")]
    ProductsNotFound(Vec<i64>),
    #[error("No payment recorded for transaction {0}")]
    PaymentNotFound(String),
    #[error("Actor is not permitted to perform this action: {0}")]
    Unauthorized(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Order status may not change from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Order is {0} and no longer accepts payment")]
    OrderNotPending(OrderStatusType),
    #[error("Transaction {0} is already associated with another order")]
    TxAlreadyUsed(String),
    #[error("Address {0} is bound to another order's invoice")]
    InvoiceReuse(String),
    #[error("Payment claim was rejected by the blockchain verifier: {reason}")]
    PaymentNotVerified { code: Option<String>, reason: String },
    #[error("Transferred amount {received} is outside the tolerance band around {expected}")]
    AmountMismatch { expected: CryptoAmount, received: CryptoAmount },
    #[error("The invoice for order {0} expired before payment confirmed; the order has been cancelled")]
    InvoiceExpired(i64),
    #[error("Product {0} is no longer available; the order has been cancelled")]
    ProductUnavailable(i64),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    StockInsufficient { product_id: i64, requested: i64, available: i64 },
    #[error("No exchange rate available for chain {0}")]
    RateUnavailable(Chain),
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("No extended public key configured for chain {0}")]
    MissingXpub(Chain),
    #[error("Conversion error: {0}")]
    Conversion(String),
}

impl StorefrontError {
    /// The stable machine-readable code automated clients branch on. `None` for errors that surface as plain 4xx/5xx
    /// without a code.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::TxAlreadyUsed(_) => Some("TX_ALREADY_USED"),
            Self::AmountMismatch { .. } => Some("AMOUNT_MISMATCH"),
            Self::InvoiceExpired(_) => Some("INVOICE_EXPIRED"),
            Self::ProductUnavailable(_) => Some("PRODUCT_UNAVAILABLE"),
            Self::StockInsufficient { .. } => Some("STOCK_INSUFFICIENT"),
            Self::InvoiceReuse(_) => Some("INVOICE_REUSE"),
            Self::PaymentNotVerified { .. } => Some("PAYMENT_NOT_VERIFIED"),
            Self::OrderNotPending(_) => Some("ORDER_NOT_PENDING"),
            Self::InvalidTransition { .. } => Some("INVALID_TRANSITION"),
            Self::UnsupportedChain(_) => Some("UNSUPPORTED_CHAIN"),
            Self::RateUnavailable(_) => Some("RATE_UNAVAILABLE"),
            Self::MissingXpub(_) => Some("MISSING_XPUB"),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StorefrontError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => {
                let msg = db.message().to_ascii_lowercase();
                if msg.contains("locked") || msg.contains("busy") || msg.contains("serialization") {
                    StorefrontError::Transient(db.message().to_string())
                } else {
                    StorefrontError::Database(e.to_string())
                }
            },
            sqlx::Error::PoolTimedOut => StorefrontError::Transient(e.to_string()),
            _ => StorefrontError::Database(e.to_string()),
        }
    }
}

impl From<crate::traits::WalletError> for StorefrontError {
    fn from(e: crate::traits::WalletError) -> Self {
        match e {
            crate::traits::WalletError::MissingXpub(chain) => StorefrontError::MissingXpub(chain),
            crate::traits::WalletError::Derivation(msg) => StorefrontError::Database(msg),
        }
    }
}

impl From<crate::traits::ExchangeRateError> for StorefrontError {
    fn from(e: crate::traits::ExchangeRateError) -> Self {
        match e {
            crate::traits::ExchangeRateError::RateDoesNotExist(chain) => StorefrontError::RateUnavailable(chain),
            crate::traits::ExchangeRateError::DatabaseError(msg) => StorefrontError::Database(msg),
        }
    }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self {
        StorefrontError::Validation(e.to_string())
    }
}

impl From<ConversionError> for StorefrontError {
    fn from(e: ConversionError) -> Self {
        StorefrontError::Conversion(e.to_string())
    }
}
