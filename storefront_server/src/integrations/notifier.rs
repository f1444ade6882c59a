use log::*;
use storefront_engine::traits::{Notifier, NotifyEvent};

/// Writes every event to the log. A messaging backend (email, webhooks) would slot in here; until one exists the
/// log line is the notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent) {
        match event {
            NotifyEvent::OrderConfirmed { order } => {
                info!("📣️ Order #{} confirmed for [{}]. Total: {}", order.id, order.buyer_id, order.total_price);
            },
            NotifyEvent::OrderCancelled { order, reason } => {
                info!("📣️ Order #{} for [{}] was cancelled. {reason}", order.id, order.buyer_id);
            },
            NotifyEvent::OrderStatusChanged { order } => {
                info!("📣️ Order #{} for [{}] is now {}", order.id, order.buyer_id, order.status);
            },
            NotifyEvent::PaymentRecorded { order_id, tx_hash, status } => {
                info!("📣️ Payment {tx_hash} against order #{order_id} recorded as {status}");
            },
        }
    }
}
