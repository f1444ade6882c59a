//! Storefront Order & Payment Consistency Engine
//!
//! This library is the core of the multi-tenant storefront platform: it creates orders against a shared stock pool,
//! verifies off-chain-submitted blockchain payments against expected amounts and addresses, and atomically moves an
//! order from `Pending` to a terminal state while guaranteeing that stock is never oversold, that a blockchain
//! transaction is never credited to two orders, and that payment confirmation and stock deduction are inseparable.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend (a `postgres` feature gate
//!    exists for parity). You should never need to access the database directly; use the public APIs instead. The
//!    exception is the data types used in the database, which are defined in [`mod@db_types`] and are public.
//! 2. The engine public API ([`mod@api`]). [`api::OrderFlowApi`] owns order creation and the status state machine,
//!    [`api::InvoiceApi`] issues crypto invoices against USD-priced orders, and [`api::PaymentApi`] runs the
//!    payment verification flow. Backends implement the traits in [`mod@traits`] to drive these APIs.
//!
//! External collaborators (the blockchain verifier, HD wallet allocator, exchange rates and the notifier) are
//! expressed as traits in [`mod@traits`] and injected explicitly. Nothing in this crate reads ambient global state.

pub mod db_types;
pub mod helpers;
pub mod status;
pub mod traits;

mod api;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    objects::{
        BulkStatusFailure,
        BulkStatusResult,
        BulkStatusUpdate,
        OrderQueryFilter,
        PaymentClaim,
        StatusUpdateItem,
        VerifyDisposition,
        VerifyOutcome,
    },
    ExchangeRateApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
};
pub use traits::{StorefrontDatabase, StorefrontError};
