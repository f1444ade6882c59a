//! Trait definitions for the engine's seams.
//!
//! [`StorefrontDatabase`] is the contract a storage backend implements; the remaining traits are the external
//! collaborators (blockchain verifier, HD wallet allocator, exchange rates, notifier) that are injected into the
//! engine APIs rather than read from ambient state.

mod blockchain;
mod exchange_rates;
mod notifier;
mod storefront_database;
mod wallet;

pub use blockchain::{BlockchainVerifier, ChainTxStatus, VerificationOutcome, VerifierError, VerifyRequest};
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use notifier::{Notifier, NotifyEvent, NullNotifier};
pub use storefront_database::{StorefrontDatabase, StorefrontError};
pub use wallet::{DerivedAddress, DeterministicWallet, WalletAllocator, WalletError};
