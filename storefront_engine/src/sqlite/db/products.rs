use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};
use storefront_common::UsdAmount;

use crate::{
    db_types::{NewProduct, Product},
    helpers::CartLine,
    traits::StorefrontError,
};

/// A cart line annotated with its locked-in product snapshot.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product: Product,
    pub quantity: i64,
}

/// The output of the stock reservation gate: validated lines plus the computed total.
#[derive(Debug, Clone)]
pub struct PricedCart {
    pub shop_id: i64,
    pub lines: Vec<PricedLine>,
    pub total: UsdAmount,
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

/// Re-reads every product referenced by the cart inside the caller's transaction. In SQLite a write transaction
/// holds the database lock, so this read is the row-lock equivalent of `SELECT ... FOR UPDATE`.
async fn fetch_cart_products(cart: &[CartLine], conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM products WHERE id IN (");
    let mut ids = builder.separated(", ");
    for line in cart {
        ids.push_bind(line.product_id);
    }
    builder.push(")");
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    Ok(products)
}

/// The stock reservation gate: missing ids, inactive products, insufficient stock for non-preorder lines, and
/// cross-shop carts are each rejected with the most specific error. Runs inside the caller's transaction
/// and must be called again at confirmation time — stock may have changed since order creation.
pub async fn check_cart(cart: &[CartLine], conn: &mut SqliteConnection) -> Result<PricedCart, StorefrontError> {
    if cart.is_empty() {
        return Err(StorefrontError::Validation("The cart contains no items".to_string()));
    }
    let products = fetch_cart_products(cart, conn).await?;
    let missing: Vec<i64> =
        cart.iter().map(|l| l.product_id).filter(|id| !products.iter().any(|p| p.id == *id)).collect();
    if !missing.is_empty() {
        return Err(StorefrontError::ProductsNotFound(missing));
    }
    let shop_id = products[0].shop_id;
    let mut lines = Vec::with_capacity(cart.len());
    let mut total = UsdAmount::default();
    for line in cart {
        let product = match products.iter().find(|p| p.id == line.product_id) {
            Some(p) => p.clone(),
            // the missing-id check above covered every cart line
            None => return Err(StorefrontError::ProductsNotFound(vec![line.product_id])),
        };
        if !product.is_active {
            return Err(StorefrontError::ProductUnavailable(product.id));
        }
        if product.shop_id != shop_id {
            return Err(StorefrontError::Validation(
                "All cart items must belong to the same shop; split the purchase into one order per shop".to_string(),
            ));
        }
        if !product.is_preorder && product.stock_quantity < line.quantity {
            return Err(StorefrontError::StockInsufficient {
                product_id: product.id,
                requested: line.quantity,
                available: product.stock_quantity,
            });
        }
        total += product.price * line.quantity;
        lines.push(PricedLine { product, quantity: line.quantity });
    }
    trace!("🛒️ Cart validated: {} lines, total {total}, shop #{shop_id}", lines.len());
    Ok(PricedCart { shop_id, lines, total })
}

/// Adjusts a product's stock by `delta` (negative to deduct). The caller has already validated availability inside
/// the same transaction.
pub async fn adjust_stock(product_id: i64, delta: i64, conn: &mut SqliteConnection) -> Result<(), StorefrontError> {
    sqlx::query(
        "UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(delta)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Inserts a new product row. Product CRUD proper lives outside this engine; this exists for seeding and admin
/// tooling.
pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, StorefrontError> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (shop_id, name, price, stock_quantity, is_active, is_preorder)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(product.shop_id)
    .bind(product.name)
    .bind(product.price)
    .bind(product.stock_quantity)
    .bind(product.is_active)
    .bind(product.is_preorder)
    .fetch_one(conn)
    .await?;
    Ok(product)
}
