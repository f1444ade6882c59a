use std::fmt::Debug;

use log::*;

use crate::{
    api::objects::{PaymentClaim, VerifyDisposition, VerifyOutcome},
    db_types::{Actor, OrderStatusType, Payment, Role},
    traits::{BlockchainVerifier, Notifier, NotifyEvent, StorefrontDatabase, StorefrontError},
};

/// `PaymentApi` runs the payment verification flow: a buyer claims an on-chain transaction pays for an order, the
/// injected verifier confirms the transfer, and the backend settles the claim atomically.
///
/// Notifications are emitted strictly *after* the backend has committed; a notification failure can never unwind a
/// settled payment.
pub struct PaymentApi<B, V, N> {
    db: B,
    verifier: V,
    notifier: N,
    /// Relative amount tolerance to apply; `None` uses the platform default.
    tolerance: Option<f64>,
}

impl<B, V, N> Debug for PaymentApi<B, V, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B, V, N> PaymentApi<B, V, N> {
    pub fn new(db: B, verifier: V, notifier: N) -> Self {
        Self { db, verifier, notifier, tolerance: None }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl<B, V, N> PaymentApi<B, V, N>
where
    B: StorefrontDatabase,
    V: BlockchainVerifier + Sync,
    N: Notifier,
{
    /// Submit a payment claim for verification.
    ///
    /// Buyers may only claim payments for themselves; admins may submit on a buyer's behalf. Every outcome that
    /// persisted something (confirmation, pending payment, burned hash, engine-side cancellation) is already
    /// committed by the time this returns.
    pub async fn submit_payment(&self, actor: &Actor, claim: &PaymentClaim) -> Result<VerifyOutcome, StorefrontError> {
        if actor.role != Role::Admin && actor.id != claim.buyer_id {
            return Err(StorefrontError::Unauthorized(
                "A payment claim must be submitted by the buyer it names".to_string(),
            ));
        }
        let result = self.db.verify_payment(claim, &self.verifier, self.tolerance).await;
        self.dispatch_events(claim.order_id, &result).await;
        result
    }

    /// Re-check an already-submitted payment for new confirmations, without resubmitting the proof.
    pub async fn check_payment_status(
        &self,
        actor: &Actor,
        order_id: i64,
        tx_hash: &str,
    ) -> Result<VerifyOutcome, StorefrontError> {
        if actor.role != Role::Admin {
            let order = self.db.fetch_order(order_id).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
            if order.buyer_id != actor.id {
                return Err(StorefrontError::Unauthorized(format!(
                    "[{}] may not query payments for order #{order_id}",
                    actor.id
                )));
            }
        }
        let result = self.db.check_payment_status(order_id, tx_hash, &self.verifier, self.tolerance).await;
        self.dispatch_events(order_id, &result).await;
        result
    }

    /// The payment history for an order.
    pub async fn payments_for_order(&self, actor: &Actor, order_id: i64) -> Result<Vec<Payment>, StorefrontError> {
        if actor.role != Role::Admin {
            let order = self.db.fetch_order(order_id).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
            if order.buyer_id != actor.id {
                return Err(StorefrontError::Unauthorized(format!(
                    "[{}] may not query payments for order #{order_id}",
                    actor.id
                )));
            }
        }
        self.db.fetch_payments_for_order(order_id).await
    }

    /// Best-effort event emission for whatever the settlement committed. Errors that cancelled the order (expired
    /// invoice, stock raced away) are looked up again so the cancellation can be reported; everything here runs
    /// outside any transaction.
    async fn dispatch_events(&self, order_id: i64, result: &Result<VerifyOutcome, StorefrontError>) {
        match result {
            Ok(outcome) => {
                self.notifier
                    .notify(NotifyEvent::PaymentRecorded {
                        order_id: outcome.order.id,
                        tx_hash: outcome.payment.tx_hash.clone(),
                        status: outcome.payment.status,
                    })
                    .await;
                if outcome.disposition == VerifyDisposition::Confirmed {
                    self.notifier.notify(NotifyEvent::OrderConfirmed { order: outcome.order.clone() }).await;
                }
            },
            Err(
                e @ (StorefrontError::InvoiceExpired(_) |
                StorefrontError::ProductUnavailable(_) |
                StorefrontError::StockInsufficient { .. }),
            ) => {
                match self.db.fetch_order(order_id).await {
                    Ok(Some(order)) if order.status == OrderStatusType::Cancelled => {
                        self.notifier
                            .notify(NotifyEvent::OrderCancelled { order, reason: e.to_string() })
                            .await;
                    },
                    Ok(_) => {},
                    Err(fetch_err) => {
                        warn!("💳️ Could not fetch order #{order_id} to report its cancellation: {fetch_err}");
                    },
                }
            },
            Err(_) => {},
        }
    }
}
