use crate::db_types::{Order, PaymentStatus};

/// A status-change message for buyer and seller. Delivery is best-effort: the engine emits these strictly outside
/// the database transaction, and a failed delivery never affects the committed state.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    OrderConfirmed { order: Order },
    OrderCancelled { order: Order, reason: String },
    OrderStatusChanged { order: Order },
    PaymentRecorded { order_id: i64, tx_hash: String, status: PaymentStatus },
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Deliver the event. Implementations swallow and log their own failures; there is nothing for a caller to do
    /// with a notification error.
    async fn notify(&self, event: NotifyEvent);
}

/// Discards every event. Useful where no messaging backend is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn notify(&self, _event: NotifyEvent) {}
}
