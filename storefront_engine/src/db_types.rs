use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use storefront_common::{CryptoAmount, UsdAmount};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        Role          --------------------------------------------------------
/// The capacity in which an actor makes a request. Sellers act on behalf of the shop that owns the order's products;
/// admins bypass ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

/// An authenticated actor. How the identity was established is the server's concern; the engine only cares about the
/// id and the role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn buyer<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: Role::Buyer }
    }

    pub fn seller<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: Role::Seller }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: Role::Admin }
    }
}

//--------------------------------------        Chain         --------------------------------------------------------
/// The blockchains the platform can invoice on. Each chain has its own HD derivation namespace and invoice rounding
/// precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Btc,
    Eth,
    Ltc,
    Doge,
}

impl Chain {
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Btc => "BTC",
            Chain::Eth => "ETH",
            Chain::Ltc => "LTC",
            Chain::Doge => "DOGE",
        }
    }

    /// The number of decimals an invoice amount is rounded to. Fewer decimals than the base-unit scale keeps invoice
    /// amounts human-checkable on low-value chains.
    pub fn invoice_decimals(&self) -> u32 {
        match self {
            Chain::Btc => 8,
            Chain::Eth => 6,
            Chain::Ltc => 8,
            Chain::Doge => 4,
        }
    }

    pub fn all() -> [Chain; 4] {
        [Chain::Btc, Chain::Eth, Chain::Ltc, Chain::Doge]
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Chain {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            "LTC" => Ok(Self::Ltc),
            "DOGE" => Ok(Self::Doge),
            s => Err(ConversionError(format!("Unsupported chain: {s}"))),
        }
    }
}

impl From<String> for Chain {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid chain symbol in database: {value}. Defaulting to BTC");
            Chain::Btc
        })
    }
}

//--------------------------------------        Shop          --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub owner_id: String,
    /// Static fallback receiving address, used only when no invoice has been issued for an order.
    pub wallet_address: Option<String>,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       Product        --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    /// Unit price in USD cents.
    pub price: UsdAmount,
    /// Physical stock on hand. Never negative for non-preorder products; mutated only inside a transaction that
    /// first re-reads the row.
    pub stock_quantity: i64,
    pub is_active: bool,
    pub is_preorder: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub shop_id: i64,
    pub name: String,
    pub price: UsdAmount,
    pub stock_quantity: i64,
    pub is_active: bool,
    pub is_preorder: bool,
}

//--------------------------------------   OrderStatusType    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created; no payment has been confirmed against it.
    Pending,
    /// Payment has been verified and stock deducted.
    Confirmed,
    /// The seller has dispatched the order.
    Shipped,
    /// The buyer has received the order. Terminal.
    Delivered,
    /// The order was cancelled by buyer, seller, or the engine (expired invoice, stock lost). Terminal.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Confirmed => write!(f, "Confirmed"),
            OrderStatusType::Shipped => write!(f, "Shipped"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid order status in database: {value}. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------        Order         --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub buyer_id: String,
    pub shop_id: i64,
    /// Order total in USD cents, locked in at order creation.
    pub total_price: UsdAmount,
    pub currency: String,
    pub delivery_address: Option<String>,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: String,
    pub delivery_address: Option<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(buyer_id: S) -> Self {
        Self { buyer_id: buyer_id.into(), delivery_address: None }
    }

    pub fn with_delivery_address<S: Into<String>>(mut self, address: S) -> Self {
        self.delivery_address = Some(address.into());
        self
    }
}

//--------------------------------------      OrderItem       --------------------------------------------------------
/// A historical snapshot of one cart line. `unit_price` and `is_preorder` are copied from the product at order time
/// and never re-joined against the live product row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: UsdAmount,
    pub is_preorder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

//--------------------------------------    InvoiceStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "Pending"),
            InvoiceStatus::Paid => write!(f, "Paid"),
            InvoiceStatus::Expired => write!(f, "Expired"),
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Paid" => Self::Paid,
            "Expired" => Self::Expired,
            _ => {
                log::error!("Invalid invoice status in database: {value}. Defaulting to Expired");
                Self::Expired
            },
        }
    }
}

//--------------------------------------    InvoiceTarget     --------------------------------------------------------
///// What an invoice bills for: an order in this engine, or a subscription managed by an external billing system.
/// Subscriptions are opaque here; the engine only tracks the id so payments can be reconciled against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceTarget {
    Order(i64),
    Subscription(i64),
}

impl Display for InvoiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceTarget::Order(id) => write!(f, "order #{id}"),
            InvoiceTarget::Subscription(id) => write!(f, "subscription #{id}"),
        }
    }
}

//--------------------------------------       Invoice        --------------------------------------------------------
/// A crypto-denominated payment request for an order or a subscription (exactly one of `order_id` and
/// `subscription_id` is set; the schema enforces it). The address is unique among non-expired invoices; an address
/// bound to one live invoice may never be reused for a different target.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub order_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub chain: Chain,
    pub address: String,
    pub crypto_amount: CryptoAmount,
    pub status: InvoiceStatus,
    pub derivation_index: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Expired || self.expires_at < now
    }

    /// Whether this invoice bills the given target. An invoice with a corrupt row (neither id set, which the schema
    /// forbids) matches nothing.
    pub fn is_for(&self, target: InvoiceTarget) -> bool {
        match target {
            InvoiceTarget::Order(id) => self.order_id == Some(id),
            InvoiceTarget::Subscription(id) => self.subscription_id == Some(id),
        }
    }
}

//--------------------------------------    PaymentStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The transaction exists on-chain but does not yet have enough confirmations.
    Pending,
    Confirmed,
    /// The verifier rejected the claim. The hash stays burned against replay.
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Confirmed => write!(f, "Confirmed"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Confirmed" => Self::Confirmed,
            "Failed" => Self::Failed,
            _ => {
                log::error!("Invalid payment status in database: {value}. Defaulting to Failed");
                Self::Failed
            },
        }
    }
}

//--------------------------------------       Payment        --------------------------------------------------------
/// An append-only record of a payment claim. `tx_hash` is globally unique for the row's lifetime: a second claim
/// against a different order or subscription for the same hash is a hard rejection, never a merge. Rows are never
/// deleted; status may progress from `Pending` to `Confirmed` as confirmations arrive.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub tx_hash: String,
    pub amount: CryptoAmount,
    pub currency: String,
    pub status: PaymentStatus,
    pub confirmations: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ExchangeRate      --------------------------------------------------------
/// A chain/USD exchange rate, in USD cents per whole coin. Rates are pushed by an operator (or a rate feeder) into
/// the backend store; invoice issuance fails hard when no rate is available.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub chain: Chain,
    /// USD cents per whole coin.
    pub rate: UsdAmount,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(chain: Chain, rate: UsdAmount, updated_at: Option<DateTime<Utc>>) -> Self {
        let updated_at = updated_at.unwrap_or_else(Utc::now);
        Self { chain, rate, updated_at }
    }

    /// Convert a USD amount into chain base units, rounding **up** to the chain's invoice precision so that an
    /// invoice never undercharges by a rounding step.
    pub fn convert_to_crypto(&self, usd: UsdAmount) -> Result<CryptoAmount, ConversionError> {
        let cents_per_coin = self.rate.value();
        if cents_per_coin <= 0 {
            return Err(ConversionError(format!("Non-positive exchange rate for {}", self.chain)));
        }
        let base_units = (usd.value() as i128) * (CryptoAmount::BASE_UNITS_PER_COIN as i128);
        let exact = base_units.div_euclid(cents_per_coin as i128);
        let remainder = base_units.rem_euclid(cents_per_coin as i128);
        let step = 10i128.pow(8 - self.chain.invoice_decimals().min(8));
        let mut units = exact + i128::from(remainder != 0);
        let offcut = units.rem_euclid(step);
        if offcut != 0 {
            units += step - offcut;
        }
        i64::try_from(units)
            .map(CryptoAmount::from)
            .map_err(|_| ConversionError(format!("{usd} at rate {} overflows a crypto amount", self.rate)))
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1 {} => {}", self.chain, self.rate)
    }
}
