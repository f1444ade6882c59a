use sqlx::SqliteConnection;

use crate::{
    db_types::{Chain, ExchangeRate},
    traits::ExchangeRateError,
};

pub async fn fetch_last_rate(chain: Chain, conn: &mut SqliteConnection) -> Result<ExchangeRate, ExchangeRateError> {
    let result: Option<ExchangeRate> =
        sqlx::query_as("SELECT chain, rate, updated_at FROM exchange_rates WHERE chain = $1 ORDER BY updated_at DESC, id DESC LIMIT 1")
            .bind(chain)
            .fetch_optional(conn)
            .await
            .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
    result.ok_or(ExchangeRateError::RateDoesNotExist(chain))
}

pub async fn set_exchange_rate(rate: &ExchangeRate, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    sqlx::query("INSERT INTO exchange_rates (chain, rate, updated_at) VALUES ($1, $2, $3)")
        .bind(rate.chain)
        .bind(rate.rate)
        .bind(rate.updated_at)
        .execute(conn)
        .await
        .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
    Ok(())
}
