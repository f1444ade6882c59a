use blake2::{Blake2b512, Digest};
use thiserror::Error;

use crate::db_types::Chain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
    pub derivation_path: String,
}

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("No extended public key is configured for chain {0}")]
    MissingXpub(Chain),
    #[error("Address derivation failed: {0}")]
    Derivation(String),
}

/// Derives a fresh receiving address per invoice from a chain's extended public key. Derivation is deterministic and
/// local; the same `(chain, xpub, index)` triple always yields the same address.
pub trait WalletAllocator {
    fn generate_address(&self, chain: Chain, xpub: &str, index: u32) -> Result<DerivedAddress, WalletError>;
}

/// A deterministic allocator that hashes `(chain, xpub, index)` into a plausible address. It is *not* a real BIP-32
/// derivation — it stands in for one in development and tests, where what matters is determinism and per-invoice
/// uniqueness, not spendability.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicWallet;

impl DeterministicWallet {
    fn coin_type(chain: Chain) -> u32 {
        match chain {
            Chain::Btc => 0,
            Chain::Eth => 60,
            Chain::Ltc => 2,
            Chain::Doge => 3,
        }
    }

    fn prefix(chain: Chain) -> &'static str {
        match chain {
            Chain::Btc => "bc1q",
            Chain::Eth => "0x",
            Chain::Ltc => "ltc1q",
            Chain::Doge => "D",
        }
    }
}

impl WalletAllocator for DeterministicWallet {
    fn generate_address(&self, chain: Chain, xpub: &str, index: u32) -> Result<DerivedAddress, WalletError> {
        if xpub.trim().is_empty() {
            return Err(WalletError::MissingXpub(chain));
        }
        let mut hasher = Blake2b512::new();
        hasher.update(chain.symbol().as_bytes());
        hasher.update(xpub.as_bytes());
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();
        let body = digest.iter().take(19).map(|b| format!("{b:02x}")).collect::<String>();
        let derivation_path = format!("m/44'/{}'/0'/0/{index}", Self::coin_type(chain));
        Ok(DerivedAddress { address: format!("{}{body}", Self::prefix(chain)), derivation_path })
    }
}
