//! Programmable stand-ins for the engine's external collaborators.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use storefront_common::{CryptoAmount, UsdAmount};

use crate::{
    db_types::{Chain, ExchangeRate},
    traits::{
        BlockchainVerifier,
        ChainTxStatus,
        ExchangeRateError,
        ExchangeRates,
        Notifier,
        NotifyEvent,
        VerificationOutcome,
        VerifierError,
        VerifyRequest,
    },
};

/// A verifier programmed per transaction hash. Unprogrammed hashes are rejected, which is also what a real
/// explorer-backed verifier does for a hash it cannot find.
#[derive(Debug, Clone, Default)]
pub struct MockVerifier {
    responses: Arc<Mutex<HashMap<String, Result<VerificationOutcome, VerifierError>>>>,
    requests: Arc<Mutex<Vec<VerifyRequest>>>,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program `tx_hash` to verify as confirmed with the given transferred amount.
    pub fn confirm(&self, tx_hash: &str, amount: CryptoAmount, confirmations: i64) {
        self.program(tx_hash, Ok(VerificationOutcome {
            amount,
            confirmations,
            status: ChainTxStatus::Confirmed,
            tx_hash: tx_hash.to_string(),
        }));
    }

    /// Program `tx_hash` to be found on-chain but short of confirmations.
    pub fn pend(&self, tx_hash: &str, amount: CryptoAmount, confirmations: i64) {
        self.program(tx_hash, Ok(VerificationOutcome {
            amount,
            confirmations,
            status: ChainTxStatus::Pending,
            tx_hash: tx_hash.to_string(),
        }));
    }

    /// Program `tx_hash` to be rejected outright (the hash gets burned).
    pub fn reject(&self, tx_hash: &str, code: &str, reason: &str) {
        self.program(tx_hash, Err(VerifierError::Rejected { code: code.to_string(), reason: reason.to_string() }));
    }

    /// Program `tx_hash` to fail transiently (the hash stays retryable).
    pub fn unavailable(&self, tx_hash: &str) {
        self.program(tx_hash, Err(VerifierError::Transient("explorer timed out".to_string())));
    }

    /// Every request the verifier has seen, in order.
    pub fn requests(&self) -> Vec<VerifyRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn program(&self, tx_hash: &str, response: Result<VerificationOutcome, VerifierError>) {
        self.responses.lock().unwrap().insert(tx_hash.to_string(), response);
    }
}

impl BlockchainVerifier for MockVerifier {
    async fn verify_incoming(&self, req: &VerifyRequest) -> Result<VerificationOutcome, VerifierError> {
        self.requests.lock().unwrap().push(req.clone());
        self.responses.lock().unwrap().get(&req.tx_hash).cloned().unwrap_or_else(|| {
            Err(VerifierError::Rejected {
                code: "TX_NOT_FOUND".to_string(),
                reason: format!("No transaction {} on chain", req.tx_hash),
            })
        })
    }
}

/// An in-memory exchange rate store, one rate per chain.
#[derive(Debug, Clone, Default)]
pub struct MemoryRates {
    rates: Arc<Mutex<HashMap<Chain, ExchangeRate>>>,
}

impl MemoryRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, chain: Chain, cents_per_coin: i64) -> Self {
        let rate = ExchangeRate::new(chain, UsdAmount::from_cents(cents_per_coin), Some(Utc::now()));
        self.rates.lock().unwrap().insert(chain, rate);
        self
    }
}

impl ExchangeRates for MemoryRates {
    async fn fetch_last_rate(&self, chain: Chain) -> Result<ExchangeRate, ExchangeRateError> {
        self.rates.lock().unwrap().get(&chain).cloned().ok_or(ExchangeRateError::RateDoesNotExist(chain))
    }

    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        self.rates.lock().unwrap().insert(rate.chain, rate.clone());
        Ok(())
    }
}

/// Captures every emitted event so tests can assert on notification behaviour.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotifyEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        self.events.lock().unwrap().push(event);
    }
}
