//! # Storefront engine public API
//!
//! The `api` module exposes the programmatic API for the order & payment consistency engine. The API is modular:
//! clients pick the pieces they need, and each API instance is created by supplying a database backend that
//! implements the backend traits the API requires, plus any external collaborators it drives.
//!
//! * [`order_flow_api`] owns order creation (cart validation included) and the order status state machine.
//! * [`invoice_api`] issues crypto invoices against USD-priced orders, with fresh HD addresses per invoice.
//! * [`payment_api`] runs the payment verification flow against an injected blockchain verifier.
//! * [`exchange_rate_api`] lets operators read and push chain/USD exchange rates.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same:
//!
//! ```rust,ignore
//! use storefront_engine::{OrderFlowApi, SqliteDatabase};
//! use storefront_engine::traits::NullNotifier;
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements StorefrontDatabase
//! let api = OrderFlowApi::new(db, NullNotifier);
//! let order = api.create_order(&actor, cart_request, None).await?;
//! ```

pub mod exchange_rate_api;
pub mod invoice_api;
pub mod objects;
pub mod order_flow_api;
pub mod payment_api;

pub use exchange_rate_api::ExchangeRateApi;
pub use invoice_api::InvoiceApi;
pub use order_flow_api::OrderFlowApi;
pub use payment_api::PaymentApi;
