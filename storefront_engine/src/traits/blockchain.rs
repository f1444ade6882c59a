use serde::{Deserialize, Serialize};
use storefront_common::CryptoAmount;
use thiserror::Error;

use crate::db_types::Chain;

/// A request to the blockchain verifier: does an incoming transaction with this hash exist, paying (at least
/// approximately) `expected` to `address` on `chain`?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub tx_hash: String,
    pub address: String,
    pub expected: CryptoAmount,
    pub chain: Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainTxStatus {
    /// The transaction exists but does not yet have enough confirmations to be considered final.
    Pending,
    Confirmed,
}

/// What the verifier found on-chain. An `Ok` outcome means the transaction exists and pays the target address;
/// whether the amount is *sufficient* is the engine's decision (the tolerance evaluator), not the verifier's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// The actually transferred amount, which may differ from the expected amount by fees or rounding.
    pub amount: CryptoAmount,
    pub confirmations: i64,
    pub status: ChainTxStatus,
    /// The canonical hash as reported by the chain.
    pub tx_hash: String,
}

/// Verifier failures are split by consequence: a `Rejected` claim burns the transaction hash (a `Failed` payment row
/// is persisted), while a `Transient` failure leaves the hash retryable.
#[derive(Debug, Clone, Error)]
pub enum VerifierError {
    #[error("Payment claim rejected ({code}): {reason}")]
    Rejected { code: String, reason: String },
    #[error("Verifier temporarily unavailable: {0}")]
    Transient(String),
}

#[allow(async_fn_in_trait)]
pub trait BlockchainVerifier {
    /// Look up the transaction on-chain and check that it pays into `req.address`.
    async fn verify_incoming(&self, req: &VerifyRequest) -> Result<VerificationOutcome, VerifierError>;
}
