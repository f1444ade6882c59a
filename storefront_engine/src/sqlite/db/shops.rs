use sqlx::SqliteConnection;

use crate::{db_types::Shop, traits::StorefrontError};

pub async fn fetch_shop(shop_id: i64, conn: &mut SqliteConnection) -> Result<Option<Shop>, sqlx::Error> {
    let shop = sqlx::query_as("SELECT * FROM shops WHERE id = $1").bind(shop_id).fetch_optional(conn).await?;
    Ok(shop)
}

/// Inserts a new shop row. Shop CRUD proper lives outside this engine; this exists for seeding and admin tooling.
pub async fn insert_shop(
    name: &str,
    owner_id: &str,
    wallet_address: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Shop, StorefrontError> {
    let shop = sqlx::query_as(
        r#"
            INSERT INTO shops (name, owner_id, wallet_address)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(name)
    .bind(owner_id)
    .bind(wallet_address)
    .fetch_one(conn)
    .await?;
    Ok(shop)
}
