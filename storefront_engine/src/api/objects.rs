use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Chain, Order, OrderStatusType, Payment},
    helpers::PaymentProof,
};

//--------------------------------------    PaymentClaim      --------------------------------------------------------
/// A buyer's claim that an on-chain transaction pays for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub order_id: i64,
    /// The claimed payer; must match the order's buyer.
    pub buyer_id: String,
    pub proof: PaymentProof,
    /// Which chain to verify against when no invoice pins one.
    pub currency_hint: Option<Chain>,
}

//--------------------------------------    VerifyOutcome     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyDisposition {
    /// The payment confirmed in this call: stock was deducted and the order is now `Confirmed`.
    Confirmed,
    /// The transaction exists but needs more confirmations; the payment row is `Pending` and the order untouched.
    AwaitingConfirmations,
    /// Idempotent replay: this hash already confirmed this order in an earlier call.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub order: Order,
    pub payment: Payment,
    pub disposition: VerifyDisposition,
}

//--------------------------------------   OrderQueryFilter   --------------------------------------------------------
/// Search criteria for order listings. Empty filter returns everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub buyer_id: Option<String>,
    pub shop_id: Option<i64>,
    pub status: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_buyer_id<S: Into<String>>(mut self, buyer_id: S) -> Self {
        self.buyer_id = Some(buyer_id.into());
        self
    }

    pub fn with_shop_id(mut self, shop_id: i64) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buyer_id.is_none()
            && self.shop_id.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }
}

//--------------------------------------  Bulk status update  --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatusUpdate {
    pub updates: Vec<StatusUpdateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateItem {
    pub order_id: i64,
    pub new_status: OrderStatusType,
}

/// Per-item breakdown of a bulk status update. Items fail independently; one bad transition never rolls back its
/// siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkStatusResult {
    pub succeeded: Vec<Order>,
    pub failed: Vec<BulkStatusFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatusFailure {
    pub order_id: i64,
    pub code: Option<String>,
    pub message: String,
}

impl BulkStatusResult {
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}
