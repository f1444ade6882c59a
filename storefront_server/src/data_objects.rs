use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_common::UsdAmount;
use storefront_engine::{
    db_types::{Actor, Chain, ExchangeRate, OrderStatusType, Role},
    helpers::{CartRequest, PaymentProof},
    traits::StorefrontError,
    OrderQueryFilter,
    PaymentClaim,
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The order creation payload. The cart fields are flattened so both dialects sit at the top level of the JSON
/// object, exactly as clients already send them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    #[serde(flatten)]
    pub cart: CartRequest,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    /// Chain symbol, e.g. "BTC". Parsed leniently so the client sees a 400 instead of a deserialization error.
    pub chain: String,
    /// Overrides the configured payment window. Capped nowhere; operators pass what they mean.
    pub ttl_seconds: Option<i64>,
}

impl InvoiceRequest {
    pub fn parse_chain(&self) -> Result<Chain, ServerError> {
        Chain::from_str(&self.chain)
            .map_err(|_| ServerError::Engine(StorefrontError::UnsupportedChain(self.chain.clone())))
    }
}

/// A subscription invoice request from the billing system. The subscription is opaque to the engine, so the USD
/// amount to bill travels with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInvoiceRequest {
    pub chain: String,
    /// The billing period's charge in USD cents.
    pub amount_cents: i64,
    pub ttl_seconds: Option<i64>,
}

impl SubscriptionInvoiceRequest {
    pub fn parse_chain(&self) -> Result<Chain, ServerError> {
        Chain::from_str(&self.chain)
            .map_err(|_| ServerError::Engine(StorefrontError::UnsupportedChain(self.chain.clone())))
    }

    pub fn amount(&self) -> Result<UsdAmount, ServerError> {
        if self.amount_cents <= 0 {
            return Err(ServerError::InvalidRequestBody("amount_cents must be positive".to_string()));
        }
        Ok(UsdAmount::from_cents(self.amount_cents))
    }
}

/// A payment submission. Exactly one of `tx_hash` and `explorer_link` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSubmission {
    pub tx_hash: Option<String>,
    pub explorer_link: Option<String>,
    /// Chain symbol hint for wallet-addressed payments with no invoice.
    pub currency: Option<String>,
    /// Admins submitting on a buyer's behalf name the buyer here. Everyone else claims as themselves and this field
    /// is ignored.
    pub buyer_id: Option<String>,
}

impl PaymentSubmission {
    pub fn into_claim(self, order_id: i64, actor: &Actor) -> Result<PaymentClaim, ServerError> {
        let buyer_id = match (actor.role, self.buyer_id) {
            (Role::Admin, Some(buyer_id)) => buyer_id,
            _ => actor.id.clone(),
        };
        let proof = match (self.tx_hash, self.explorer_link) {
            (Some(hash), None) => PaymentProof::TxHash(hash),
            (None, Some(link)) => PaymentProof::ExplorerLink(link),
            _ => {
                return Err(ServerError::InvalidRequestBody(
                    "Provide exactly one of 'tx_hash' and 'explorer_link'".to_string(),
                ))
            },
        };
        let currency_hint = match self.currency {
            Some(symbol) => Some(
                Chain::from_str(&symbol)
                    .map_err(|_| ServerError::Engine(StorefrontError::UnsupportedChain(symbol)))?,
            ),
            None => None,
        };
        Ok(PaymentClaim { order_id, buyer_id, proof, currency_hint })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub new_status: OrderStatusType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateUpdate {
    pub chain: String,
    /// USD cents per whole coin.
    pub rate_cents: i64,
}

impl RateUpdate {
    pub fn into_rate(self) -> Result<ExchangeRate, ServerError> {
        let chain = Chain::from_str(&self.chain)
            .map_err(|_| ServerError::Engine(StorefrontError::UnsupportedChain(self.chain.clone())))?;
        if self.rate_cents <= 0 {
            return Err(ServerError::InvalidRequestBody("rate_cents must be positive".to_string()));
        }
        Ok(ExchangeRate::new(chain, UsdAmount::from_cents(self.rate_cents), None))
    }
}

/// Order search query parameters. `status` takes a comma-separated list of status names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderSearchQuery {
    pub buyer_id: Option<String>,
    pub shop_id: Option<i64>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderSearchQuery {
    pub fn into_filter(self) -> Result<OrderQueryFilter, ServerError> {
        let status = match self.status {
            Some(s) => {
                let parsed = s
                    .split(',')
                    .map(|item| OrderStatusType::from_str(item.trim()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
                Some(parsed)
            },
            None => None,
        };
        Ok(OrderQueryFilter {
            buyer_id: self.buyer_id,
            shop_id: self.shop_id,
            status,
            since: self.since,
            until: self.until,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn both_cart_dialects_deserialize_through_the_flattened_request() {
        let single: NewOrderRequest =
            serde_json::from_str(r#"{"product_id": 7, "quantity": 2, "delivery_address": "12 Main St"}"#).unwrap();
        assert_eq!(single.delivery_address.as_deref(), Some("12 Main St"));
        assert_eq!(single.cart.normalize().unwrap().len(), 1);
        let multi: NewOrderRequest =
            serde_json::from_str(r#"{"items": [{"product_id": 1, "quantity": 1}, {"product_id": 2, "quantity": 3}]}"#)
                .unwrap();
        assert!(multi.delivery_address.is_none());
        assert_eq!(multi.cart.normalize().unwrap().len(), 2);
    }

    #[test]
    fn a_submission_needs_exactly_one_proof() {
        let alice = Actor::buyer("alice");
        let both = PaymentSubmission {
            tx_hash: Some("aa".repeat(32)),
            explorer_link: Some("https://mempool.space/tx/abc".into()),
            currency: None,
            buyer_id: None,
        };
        assert!(both.into_claim(1, &alice).is_err());
        let neither = PaymentSubmission { tx_hash: None, explorer_link: None, currency: None, buyer_id: None };
        assert!(neither.into_claim(1, &alice).is_err());
        let ok = PaymentSubmission {
            tx_hash: Some("aa".repeat(32)),
            explorer_link: None,
            currency: Some("btc".into()),
            buyer_id: None,
        };
        let claim = ok.into_claim(1, &alice).unwrap();
        assert_eq!(claim.currency_hint, Some(Chain::Btc));
        assert_eq!(claim.buyer_id, "alice");
    }

    #[test]
    fn only_admins_may_name_another_buyer() {
        let submission = PaymentSubmission {
            tx_hash: Some("aa".repeat(32)),
            explorer_link: None,
            currency: None,
            buyer_id: Some("bob".into()),
        };
        let claim = submission.clone().into_claim(1, &Actor::buyer("alice")).unwrap();
        assert_eq!(claim.buyer_id, "alice");
        let claim = submission.into_claim(1, &Actor::admin("root")).unwrap();
        assert_eq!(claim.buyer_id, "bob");
    }

    #[test]
    fn status_lists_parse_from_comma_separated_query_values() {
        let query = OrderSearchQuery { status: Some("Pending, Confirmed".into()), ..Default::default() };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.status, Some(vec![OrderStatusType::Pending, OrderStatusType::Confirmed]));
        let query = OrderSearchQuery { status: Some("Bogus".into()), ..Default::default() };
        assert!(query.into_filter().is_err());
    }
}
