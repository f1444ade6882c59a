//! Integration tests for invoice issuance: idempotency, HD address allocation, rate failures, and the expiry sweep.

use chrono::{Duration, Utc};
use storefront_common::UsdAmount;
use storefront_engine::{
    db_types::{Actor, Chain, InvoiceStatus, OrderStatusType},
    helpers::{CartLine, CartRequest},
    test_utils::{
        prepare_test_env,
        random_db_path,
        seed::{backdate_invoice, rebind_invoice_address, seed_product, seed_rate, seed_shop},
        RecordingNotifier,
    },
    traits::{DeterministicWallet, NotifyEvent, WalletAllocator},
    InvoiceApi,
    OrderFlowApi,
    SqliteDatabase,
    StorefrontDatabase,
    StorefrontError,
};

const XPUB: &str = "xpub6CUGRUonZSQ4TWtTMmzXdrXDtypWKiKrhko4egpiMZbpiaQL2jkwSB1icqYh2cfDfVxdx4df189oLKnC5fSwqPfgyP3hooxujYzAu3fDVmz";

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database")
}

async fn pending_order(db: &SqliteDatabase, buyer: &str, price_cents: i64) -> i64 {
    let shop = seed_shop(db, "Widget Hut", "wendy", None).await;
    let product = seed_product(db, shop.id, "Widget", price_cents, 10).await;
    let api = OrderFlowApi::new(db.clone(), RecordingNotifier::new());
    let cart = CartRequest::Multi { items: vec![CartLine::new(product.id, 1)] };
    api.create_order(&Actor::buyer(buyer), cart, None).await.expect("Error creating order").order.id
}

#[tokio::test]
async fn invoice_issuance_is_idempotent() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);
    let alice = Actor::buyer("alice");

    let (first, fresh) = api.issue_invoice(&alice, order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(fresh);
    // $100 at $42,735.04/coin, rounded up to 8 decimals
    assert_eq!(first.crypto_amount.value(), 234_001);
    assert_eq!(first.status, InvoiceStatus::Pending);

    let (second, fresh) = api.issue_invoice(&alice, order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(!fresh);
    assert_eq!(second.id, first.id);
    assert_eq!(second.address, first.address);
    assert_eq!(second.derivation_index, first.derivation_index);
}

#[tokio::test]
async fn each_invoice_gets_a_fresh_address() {
    let db = new_db().await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let shop = seed_shop(&db, "Widget Hut", "wendy", None).await;
    let product = seed_product(&db, shop.id, "Widget", 10_000, 10).await;
    let orders = OrderFlowApi::new(db.clone(), RecordingNotifier::new());
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);

    let mut addresses = Vec::new();
    for buyer in ["alice", "bob", "carol"] {
        let actor = Actor::buyer(buyer);
        let cart = CartRequest::Single { product_id: product.id, quantity: 1 };
        let order = orders.create_order(&actor, cart, None).await.unwrap().order;
        let (invoice, _) = api.issue_invoice(&actor, order.id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
        addresses.push((invoice.address, invoice.derivation_index));
    }
    assert_eq!(addresses.len(), 3);
    assert_eq!(addresses[0].1, 0);
    assert_eq!(addresses[1].1, 1);
    assert_eq!(addresses[2].1, 2);
    assert_ne!(addresses[0].0, addresses[1].0);
    assert_ne!(addresses[1].0, addresses[2].0);
}

#[tokio::test]
async fn missing_rate_is_a_hard_failure() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);

    let err =
        api.issue_invoice(&Actor::buyer("alice"), order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, StorefrontError::RateUnavailable(Chain::Btc)), "unexpected error: {err}");
    // nothing was persisted, no index consumed
    assert!(db.fetch_active_invoice(order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn an_expired_invoice_is_replaced_not_returned() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);
    let alice = Actor::buyer("alice");

    let (first, _) = api.issue_invoice(&alice, order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    backdate_invoice(&db, first.id).await;
    assert!(db.fetch_active_invoice(order_id).await.unwrap().is_none());

    let (second, fresh) = api.issue_invoice(&alice, order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(fresh);
    assert_ne!(second.id, first.id);
    assert_ne!(second.address, first.address);
    assert!(second.derivation_index > first.derivation_index);
}

#[tokio::test]
async fn only_the_buyer_or_an_admin_may_request_an_invoice() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let api = InvoiceApi::new(db, DeterministicWallet);

    let err =
        api.issue_invoice(&Actor::buyer("bob"), order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, StorefrontError::Unauthorized(_)));
    assert!(api.issue_invoice(&Actor::admin("root"), order_id, Chain::Btc, XPUB, Duration::hours(1)).await.is_ok());
}

#[tokio::test]
async fn cancelled_orders_cannot_be_invoiced() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let orders = OrderFlowApi::new(db.clone(), RecordingNotifier::new());
    orders.update_status(&Actor::buyer("alice"), order_id, OrderStatusType::Cancelled).await.unwrap();

    let api = InvoiceApi::new(db, DeterministicWallet);
    let err =
        api.issue_invoice(&Actor::buyer("alice"), order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, StorefrontError::OrderNotPending(OrderStatusType::Cancelled)), "unexpected error: {err}");
}

#[tokio::test]
async fn the_expiry_sweep_cancels_unpaid_orders() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 10_000).await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let invoices = InvoiceApi::new(db.clone(), DeterministicWallet);
    let (invoice, _) =
        invoices.issue_invoice(&Actor::buyer("alice"), order_id, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    backdate_invoice(&db, invoice.id).await;

    let notifier = RecordingNotifier::new();
    let orders = OrderFlowApi::new(db.clone(), notifier.clone());
    let cancelled = orders.expire_stale(Utc::now()).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, order_id);
    assert_eq!(cancelled[0].status, OrderStatusType::Cancelled);
    assert!(matches!(notifier.events()[0], NotifyEvent::OrderCancelled { .. }));

    // the sweep is idempotent
    let cancelled = orders.expire_stale(Utc::now()).await.unwrap();
    assert!(cancelled.is_empty());
}

#[tokio::test]
async fn subscription_invoices_are_idempotent_and_admin_only() {
    let db = new_db().await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);
    let root = Actor::admin("root");
    let amount = UsdAmount::from_cents(10_000);

    let (first, fresh) =
        api.issue_subscription_invoice(&root, 42, amount, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(fresh);
    assert_eq!(first.subscription_id, Some(42));
    assert!(first.order_id.is_none());
    // the same $100 prices to the same 234,001 base units as an order would
    assert_eq!(first.crypto_amount.value(), 234_001);

    let (second, fresh) =
        api.issue_subscription_invoice(&root, 42, amount, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(!fresh);
    assert_eq!(second.id, first.id);
    assert_eq!(second.address, first.address);

    // a buyer is not the billing system
    let err = api
        .issue_subscription_invoice(&Actor::buyer("alice"), 42, amount, Chain::Btc, XPUB, Duration::hours(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::Unauthorized(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn the_expiry_sweep_leaves_subscription_invoices_to_the_billing_system() {
    let db = new_db().await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);
    let root = Actor::admin("root");
    let amount = UsdAmount::from_cents(2_500);

    let (invoice, _) =
        api.issue_subscription_invoice(&root, 7, amount, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    backdate_invoice(&db, invoice.id).await;

    // there is no order to cancel; the sweep just retires the invoice
    let orders = OrderFlowApi::new(db.clone(), RecordingNotifier::new());
    let cancelled = orders.expire_stale(Utc::now()).await.unwrap();
    assert!(cancelled.is_empty());

    // the next billing cycle gets a fresh invoice and address
    let (next, fresh) =
        api.issue_subscription_invoice(&root, 7, amount, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    assert!(fresh);
    assert_ne!(next.id, invoice.id);
    assert_ne!(next.address, invoice.address);
}

#[tokio::test]
async fn a_derivation_collision_refuses_issuance() {
    let db = new_db().await;
    seed_rate(&db, Chain::Btc, 4_273_504).await;
    let order_a = pending_order(&db, "alice", 10_000).await;
    let order_b = pending_order(&db, "bob", 10_000).await;
    let api = InvoiceApi::new(db.clone(), DeterministicWallet);

    let (first, _) =
        api.issue_invoice(&Actor::buyer("alice"), order_a, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap();
    // alias alice's live invoice onto the address the next index will derive
    let next = DeterministicWallet.generate_address(Chain::Btc, XPUB, 1).unwrap().address;
    rebind_invoice_address(&db, first.id, &next).await;

    let err =
        api.issue_invoice(&Actor::buyer("bob"), order_b, Chain::Btc, XPUB, Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, StorefrontError::InvoiceReuse(ref addr) if addr == &next), "unexpected error: {err}");
    assert_eq!(err.code(), Some("INVOICE_REUSE"));
    // nothing was persisted for bob's order
    assert!(db.fetch_active_invoice(order_b).await.unwrap().is_none());
}

#[tokio::test]
async fn doge_invoices_round_up_to_four_decimals() {
    let db = new_db().await;
    let order_id = pending_order(&db, "alice", 125).await;
    // $0.13 per DOGE
    seed_rate(&db, Chain::Doge, 13).await;
    let api = InvoiceApi::new(db, DeterministicWallet);

    let (invoice, _) =
        api.issue_invoice(&Actor::buyer("alice"), order_id, Chain::Doge, XPUB, Duration::hours(1)).await.unwrap();
    assert_eq!(invoice.chain, Chain::Doge);
    // rounded up to a whole 0.0001 DOGE step
    assert_eq!(invoice.crypto_amount.value() % 10_000, 0);
    assert!(invoice.address.starts_with('D'));
}
