//! Seed data helpers for integration tests. Shop and product CRUD proper is outside the engine, so tests reach
//! through the low-level db functions to set the stage.

use chrono::Utc;
use storefront_common::UsdAmount;

use crate::{
    db_types::{Chain, ExchangeRate, NewProduct, Product, Shop},
    sqlite::db::{products, shops},
    traits::ExchangeRates,
    SqliteDatabase,
};

pub async fn seed_shop(db: &SqliteDatabase, name: &str, owner_id: &str, wallet_address: Option<&str>) -> Shop {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    shops::insert_shop(name, owner_id, wallet_address, &mut conn).await.expect("Error seeding shop")
}

pub async fn seed_product(db: &SqliteDatabase, shop_id: i64, name: &str, price_cents: i64, stock: i64) -> Product {
    let product = NewProduct {
        shop_id,
        name: name.to_string(),
        price: UsdAmount::from_cents(price_cents),
        stock_quantity: stock,
        is_active: true,
        is_preorder: false,
    };
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::insert_product(product, &mut conn).await.expect("Error seeding product")
}

pub async fn seed_preorder_product(db: &SqliteDatabase, shop_id: i64, name: &str, price_cents: i64) -> Product {
    let product = NewProduct {
        shop_id,
        name: name.to_string(),
        price: UsdAmount::from_cents(price_cents),
        stock_quantity: 0,
        is_active: true,
        is_preorder: true,
    };
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::insert_product(product, &mut conn).await.expect("Error seeding product")
}

/// Directly adjust a product's stock, bypassing the engine. Used to simulate stock racing away between order
/// creation and payment confirmation.
pub async fn drain_stock(db: &SqliteDatabase, product_id: i64, amount: i64) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::adjust_stock(product_id, -amount, &mut conn).await.expect("Error draining stock");
}

/// Flip a product to preorder after orders have already snapshotted it, simulating a seller editing the listing
/// while an order is in flight.
pub async fn mark_preorder(db: &SqliteDatabase, product_id: i64) {
    sqlx::query("UPDATE products SET is_preorder = 1 WHERE id = $1")
        .bind(product_id)
        .execute(db.pool())
        .await
        .expect("Error marking product as preorder");
}

pub async fn deactivate_product(db: &SqliteDatabase, product_id: i64) {
    sqlx::query("UPDATE products SET is_active = 0 WHERE id = $1")
        .bind(product_id)
        .execute(db.pool())
        .await
        .expect("Error deactivating product");
}

/// Rewind an invoice's expiry into the past, simulating a payment window that has closed.
pub async fn backdate_invoice(db: &SqliteDatabase, invoice_id: i64) {
    sqlx::query("UPDATE invoices SET expires_at = datetime('now', '-1 hour') WHERE id = $1")
        .bind(invoice_id)
        .execute(db.pool())
        .await
        .expect("Error backdating invoice");
}

/// Point a live invoice at a chosen address, simulating a derivation collision between two invoices.
pub async fn rebind_invoice_address(db: &SqliteDatabase, invoice_id: i64, address: &str) {
    sqlx::query("UPDATE invoices SET address = $1 WHERE id = $2")
        .bind(address)
        .bind(invoice_id)
        .execute(db.pool())
        .await
        .expect("Error rebinding invoice address");
}

pub async fn seed_rate(db: &SqliteDatabase, chain: Chain, cents_per_coin: i64) -> ExchangeRate {
    let rate = ExchangeRate::new(chain, UsdAmount::from_cents(cents_per_coin), Some(Utc::now()));
    db.set_exchange_rate(&rate).await.expect("Error seeding exchange rate");
    rate
}
