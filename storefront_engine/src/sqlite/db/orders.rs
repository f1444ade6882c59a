use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};
use storefront_common::UsdAmount;

use crate::{
    api::objects::OrderQueryFilter,
    db_types::{NewOrder, Order, OrderItem, OrderStatusType},
    sqlite::db::products::PricedCart,
    traits::StorefrontError,
};

/// Inserts the order row and one item row per cart line, using the caller's transaction. Stock is untouched here;
/// reservation is deferred to payment confirmation.
pub async fn insert_order(
    order: NewOrder,
    cart: &PricedCart,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<(Order, Vec<OrderItem>), StorefrontError> {
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (buyer_id, shop_id, total_price, currency, delivery_address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order.buyer_id)
    .bind(cart.shop_id)
    .bind(cart.total)
    .bind(currency)
    .bind(order.delivery_address)
    .fetch_one(&mut *conn)
    .await?;
    let mut items = Vec::with_capacity(cart.lines.len());
    for line in &cart.lines {
        let item: OrderItem = sqlx::query_as(
            r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price, is_preorder)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *;
            "#,
        )
        .bind(inserted.id)
        .bind(line.product.id)
        .bind(line.quantity)
        .bind(line.product.price)
        .bind(line.product.is_preorder)
        .fetch_one(&mut *conn)
        .await?;
        items.push(item);
    }
    debug!("📝️ Order #{} created with {} items, total {}", inserted.id, items.len(), inserted.total_price);
    Ok((inserted, items))
}

pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub(crate) async fn update_order_status(
    order_id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, StorefrontError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(StorefrontError::OrderNotFound(order_id))
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(shop_id) = query.shop_id {
        where_clause.push("shop_id = ");
        where_clause.push_bind_unseparated(shop_id);
    }
    if let Some(statuses) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let statuses = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// Returns stock to each non-preorder line of a cancelled order. Lines whose product has since been deleted are
/// logged and skipped — a deleted product cannot receive stock back.
pub(crate) async fn return_stock_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<(), StorefrontError> {
    let items = fetch_order_items(order_id, &mut *conn).await?;
    for item in items.iter().filter(|i| !i.is_preorder) {
        let updated = sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(item.quantity)
        .bind(item.product_id)
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() == 0 {
            log::warn!(
                "📝️ Product #{} from order #{order_id} no longer exists; {} units could not be returned",
                item.product_id,
                item.quantity
            );
        } else {
            trace!("📝️ Returned {} units to product #{}", item.quantity, item.product_id);
        }
    }
    Ok(())
}

/// Recomputes an order total from its item snapshots. Used as a consistency check in tests and admin tooling.
pub async fn order_items_total(order_id: i64, conn: &mut SqliteConnection) -> Result<UsdAmount, sqlx::Error> {
    let items = fetch_order_items(order_id, conn).await?;
    Ok(items.iter().map(|i| i.unit_price * i.quantity).sum())
}
