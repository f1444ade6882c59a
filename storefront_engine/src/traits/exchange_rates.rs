use thiserror::Error;

use crate::db_types::{Chain, ExchangeRate};

#[derive(Debug, Clone, Error)]
pub enum ExchangeRateError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No exchange rate is available for {0}")]
    RateDoesNotExist(Chain),
}

#[allow(async_fn_in_trait)]
pub trait ExchangeRates {
    /// Fetch the most recent exchange rate for the given chain. If no rate has ever been stored, the error
    /// [`ExchangeRateError::RateDoesNotExist`] is returned — invoice issuance treats that as a hard failure.
    async fn fetch_last_rate(&self, chain: Chain) -> Result<ExchangeRate, ExchangeRateError>;
    /// Save a new exchange rate for the chain to the backend storage.
    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError>;
}
