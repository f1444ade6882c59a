use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::objects::{BulkStatusFailure, BulkStatusResult, BulkStatusUpdate, OrderQueryFilter},
    db_types::{Actor, NewOrder, Order, OrderStatusType, OrderWithItems, Role},
    helpers::CartRequest,
    status::role_may_request,
    traits::{Notifier, NotifyEvent, StorefrontDatabase, StorefrontError},
};

/// `OrderFlowApi` is the primary API for creating orders and moving them through the status state machine in
/// response to buyer, seller and admin requests.
pub struct OrderFlowApi<B, N> {
    db: B,
    notifier: N,
}

impl<B, N> Debug for OrderFlowApi<B, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, N> OrderFlowApi<B, N> {
    pub fn new(db: B, notifier: N) -> Self {
        Self { db, notifier }
    }
}

impl<B, N> OrderFlowApi<B, N>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    /// Create a new order on behalf of the buyer.
    ///
    /// The raw request (either cart dialect) is normalised and validated here; the stock reservation gate and the
    /// atomic insert happen in the backend. The order is created `Pending` and no stock is reserved until payment
    /// confirms.
    pub async fn create_order(
        &self,
        buyer: &Actor,
        request: CartRequest,
        delivery_address: Option<String>,
    ) -> Result<OrderWithItems, StorefrontError> {
        let lines = request.normalize()?;
        let mut order = NewOrder::new(buyer.id.clone());
        if let Some(address) = delivery_address {
            order = order.with_delivery_address(address);
        }
        let result = self.db.create_order(order, &lines).await?;
        info!("📦️ Order #{} created for [{}] with {} lines", result.order.id, buyer.id, result.items.len());
        Ok(result)
    }

    /// Fetch one order with its items, subject to visibility: buyers see their own orders, sellers see orders
    /// against their shop, admins see everything.
    pub async fn order(&self, actor: &Actor, order_id: i64) -> Result<OrderWithItems, StorefrontError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        self.authorize_view(actor, &order).await?;
        let items = self.db.fetch_order_items(order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Search orders. Buyers are always scoped to their own orders; sellers must scope the query to a shop they
    /// own; admins may query freely.
    pub async fn search_orders(&self, actor: &Actor, mut query: OrderQueryFilter) -> Result<Vec<Order>, StorefrontError> {
        match actor.role {
            Role::Admin => {},
            Role::Buyer => {
                query.buyer_id = Some(actor.id.clone());
            },
            Role::Seller => {
                let shop_id = query.shop_id.ok_or_else(|| {
                    StorefrontError::Unauthorized("Sellers must scope order searches to one of their shops".to_string())
                })?;
                let shop = self.db.fetch_shop(shop_id).await?.ok_or(StorefrontError::ShopNotFound(shop_id))?;
                if shop.owner_id != actor.id {
                    return Err(StorefrontError::Unauthorized(format!(
                        "[{}] does not own shop #{shop_id}",
                        actor.id
                    )));
                }
            },
        }
        self.db.search_orders(query).await
    }

    /// Request a status change on the order.
    ///
    /// The actor is gated twice: by ownership (buyers may only touch their orders, sellers orders against their
    /// shop) and by [`role_may_request`]. The transition itself is then judged by the backend's state machine;
    /// re-applying the current status is an idempotent no-op. `Confirmed → Cancelled` returns stock.
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: i64,
        new_status: OrderStatusType,
    ) -> Result<Order, StorefrontError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(StorefrontError::OrderNotFound(order_id))?;
        self.authorize_view(actor, &order).await?;
        if !role_may_request(actor, order.status, new_status) {
            return Err(StorefrontError::Unauthorized(format!(
                "A {} may not move an order from {} to {new_status}",
                actor.role, order.status
            )));
        }
        let updated = self.db.transition_order(order_id, new_status).await?;
        if updated.status != order.status {
            let event = match updated.status {
                OrderStatusType::Cancelled => NotifyEvent::OrderCancelled {
                    order: updated.clone(),
                    reason: format!("Cancelled by {} [{}]", actor.role, actor.id),
                },
                OrderStatusType::Confirmed => NotifyEvent::OrderConfirmed { order: updated.clone() },
                _ => NotifyEvent::OrderStatusChanged { order: updated.clone() },
            };
            self.notifier.notify(event).await;
        }
        Ok(updated)
    }

    /// Apply many status updates in one call. Items fail independently; one illegal transition never rolls back
    /// its siblings. The per-item breakdown is always returned, successes and failures side by side.
    pub async fn bulk_update_status(&self, actor: &Actor, request: BulkStatusUpdate) -> BulkStatusResult {
        let mut result = BulkStatusResult::default();
        for item in request.updates {
            match self.update_status(actor, item.order_id, item.new_status).await {
                Ok(order) => result.succeeded.push(order),
                Err(e) => {
                    debug!("📦️ Bulk update: order #{} failed: {e}", item.order_id);
                    result.failed.push(BulkStatusFailure {
                        order_id: item.order_id,
                        code: e.code().map(String::from),
                        message: e.to_string(),
                    });
                },
            }
        }
        result
    }

    /// The expiry sweep. Marks overdue invoices `Expired`, cancels their still-`Pending` orders, and notifies each
    /// cancellation. Meant to be driven on a timer by the host.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StorefrontError> {
        let cancelled = self.db.expire_stale_invoices(now).await?;
        for order in &cancelled {
            let event = NotifyEvent::OrderCancelled {
                order: order.clone(),
                reason: "The payment window closed before the invoice was paid".to_string(),
            };
            self.notifier.notify(event).await;
        }
        Ok(cancelled)
    }

    async fn authorize_view(&self, actor: &Actor, order: &Order) -> Result<(), StorefrontError> {
        match actor.role {
            Role::Admin => Ok(()),
            Role::Buyer if order.buyer_id == actor.id => Ok(()),
            Role::Seller => {
                let shop =
                    self.db.fetch_shop(order.shop_id).await?.ok_or(StorefrontError::ShopNotFound(order.shop_id))?;
                if shop.owner_id == actor.id {
                    Ok(())
                } else {
                    Err(StorefrontError::Unauthorized(format!("[{}] does not own shop #{}", actor.id, order.shop_id)))
                }
            },
            _ => Err(StorefrontError::Unauthorized(format!("[{}] may not access order #{}", actor.id, order.id))),
        }
    }
}
