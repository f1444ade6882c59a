//! The block-explorer payment verifier.
//!
//! Talks to an explorer aggregator over its REST API to confirm that a claimed transaction exists and pays into the
//! expected address. The aggregator speaks one JSON dialect for every chain:
//!
//! `GET {base}/api/v1/{chain}/tx/{hash}` →
//! `{"tx_hash": "...", "confirmations": n, "outputs": [{"address": "...", "amount": base_units}, ...]}`
//!
//! A 404 is a rejection (the hash is burned by the engine); network trouble and 5xx responses are transient and leave
//! the claim retryable.

use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::Deserialize;
use storefront_common::{CryptoAmount, Secret};
use storefront_engine::traits::{BlockchainVerifier, ChainTxStatus, VerificationOutcome, VerifierError, VerifyRequest};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct ExplorerVerifier {
    base_url: String,
    min_confirmations: i64,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    tx_hash: String,
    confirmations: i64,
    outputs: Vec<TxOutput>,
}

#[derive(Debug, Deserialize)]
struct TxOutput {
    address: String,
    amount: i64,
}

impl ExplorerVerifier {
    pub fn new(base_url: &str, api_key: &Secret<String>, min_confirmations: i64) -> Result<Self, VerifierError> {
        let mut headers = HeaderMap::with_capacity(2);
        if !api_key.reveal().is_empty() {
            let val = HeaderValue::from_str(api_key.reveal().as_str())
                .map_err(|e| VerifierError::Transient(format!("Invalid explorer API key: {e}")))?;
            headers.insert("X-Api-Key", val);
        }
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| VerifierError::Transient(format!("Could not build explorer client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            min_confirmations,
            client: Arc::new(client),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, VerifierError> {
        Self::new(&config.explorer_url, &config.explorer_api_key, config.min_confirmations)
    }

    fn url(&self, req: &VerifyRequest) -> String {
        format!("{}/api/v1/{}/tx/{}", self.base_url, req.chain.symbol().to_ascii_lowercase(), req.tx_hash)
    }
}

impl BlockchainVerifier for ExplorerVerifier {
    async fn verify_incoming(&self, req: &VerifyRequest) -> Result<VerificationOutcome, VerifierError> {
        let url = self.url(req);
        trace!("🔍️ Querying explorer: {url}");
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("🔍️ Explorer request failed: {e}");
            VerifierError::Transient(e.to_string())
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(VerifierError::Rejected {
                    code: "TX_NOT_FOUND".to_string(),
                    reason: format!("Transaction {} does not exist on {}", req.tx_hash, req.chain),
                });
            },
            s if s.is_server_error() => {
                return Err(VerifierError::Transient(format!("Explorer returned {s}")));
            },
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(VerifierError::Rejected {
                    code: "EXPLORER_REFUSED".to_string(),
                    reason: format!("Explorer returned {s}: {message}"),
                });
            },
            _ => {},
        }
        let tx = response.json::<TxResponse>().await.map_err(|e| VerifierError::Transient(e.to_string()))?;
        let paid: i64 = tx.outputs.iter().filter(|o| o.address == req.address).map(|o| o.amount).sum();
        if paid == 0 {
            return Err(VerifierError::Rejected {
                code: "WRONG_ADDRESS".to_string(),
                reason: format!("Transaction {} pays nothing to {}", tx.tx_hash, req.address),
            });
        }
        let status =
            if tx.confirmations >= self.min_confirmations { ChainTxStatus::Confirmed } else { ChainTxStatus::Pending };
        debug!(
            "🔍️ Transaction {} pays {} base units to {} with {} confirmations ({status:?})",
            tx.tx_hash, paid, req.address, tx.confirmations
        );
        Ok(VerificationOutcome {
            amount: CryptoAmount::from_base_units(paid),
            confirmations: tx.confirmations,
            status,
            tx_hash: tx.tx_hash,
        })
    }
}
