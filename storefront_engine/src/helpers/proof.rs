//! Payment proof resolution.
//!
//! A payment claim carries either a bare transaction hash or a block-explorer link pasted by the buyer. Both resolve
//! to the canonical hash here, before any row is locked, so the rest of the engine only ever sees one shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProof {
    TxHash(String),
    ExplorerLink(String),
}

impl PaymentProof {
    /// Resolve the proof into a normalised (lowercase, unprefixed) transaction hash.
    pub fn resolve(&self) -> Option<String> {
        match self {
            PaymentProof::TxHash(hash) => normalize_hash(hash),
            PaymentProof::ExplorerLink(link) => extract_tx_hash(link),
        }
    }
}

/// Pulls a transaction hash out of a block-explorer URL. Matches the common `/tx/<hash>` path segment used by
/// blockstream.info, mempool.space, blockchair, etherscan and friends.
pub fn extract_tx_hash(link: &str) -> Option<String> {
    let re = regex::Regex::new(r"/(?:tx|transaction)/(?:0x)?([0-9a-fA-F]{16,128})").ok()?;
    re.captures(link).and_then(|c| c.get(1)).and_then(|m| normalize_hash(m.as_str()))
}

fn normalize_hash(raw: &str) -> Option<String> {
    let hash = raw.trim().trim_start_matches("0x");
    let valid = (16..=128).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| hash.to_ascii_lowercase())
}
