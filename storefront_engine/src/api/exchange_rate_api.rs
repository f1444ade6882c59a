use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Actor, Chain, ExchangeRate, Role},
    traits::{ExchangeRates, StorefrontError},
};

/// `ExchangeRateApi` lets operators read and push chain/USD exchange rates. Rates are stored, not fetched live:
/// invoice issuance always prices against the most recent pushed rate, and fails hard when there is none.
pub struct ExchangeRateApi<B> {
    db: B,
}

impl<B> Debug for ExchangeRateApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeRateApi")
    }
}

impl<B> ExchangeRateApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: ExchangeRates> ExchangeRateApi<B> {
    pub async fn fetch_last_rate(&self, chain: Chain) -> Result<ExchangeRate, StorefrontError> {
        let rate = self.db.fetch_last_rate(chain).await?;
        Ok(rate)
    }

    /// Push a new rate. Admin only.
    pub async fn set_exchange_rate(&self, actor: &Actor, rate: &ExchangeRate) -> Result<(), StorefrontError> {
        if actor.role != Role::Admin {
            return Err(StorefrontError::Unauthorized("Only admins may set exchange rates".to_string()));
        }
        self.db.set_exchange_rate(rate).await?;
        info!("🪙️ Exchange rate updated by [{}]: {rate}", actor.id);
        Ok(())
    }
}
