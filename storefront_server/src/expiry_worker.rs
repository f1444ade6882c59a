use chrono::Utc;
use log::*;
use storefront_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::integrations::LogNotifier;

/// Starts the invoice expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick the worker marks overdue invoices as `Expired` and cancels their still-`Pending` orders. A payment
/// that lands between ticks is still handled correctly: expiry is re-judged inside the verification transaction, so
/// the sweep is a janitor, not a gatekeeper.
pub fn start_expiry_worker(db: SqliteDatabase, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let api = OrderFlowApi::new(db, LogNotifier);
        info!("🕰️ Invoice expiry worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            debug!("🕰️ Running invoice expiry sweep");
            match api.expire_stale(Utc::now()).await {
                Ok(cancelled) if cancelled.is_empty() => {
                    trace!("🕰️ No orders expired this sweep");
                },
                Ok(cancelled) => {
                    info!("🕰️ {} orders cancelled by the expiry sweep: {}", cancelled.len(), order_list(&cancelled));
                },
                Err(e) => {
                    error!("🕰️ Error running invoice expiry sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("#{} buyer: [{}]", o.id, o.buyer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
