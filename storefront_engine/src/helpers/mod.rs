mod cart;
mod proof;
mod tolerance;

pub use cart::{CartError, CartLine, CartRequest, MAX_LINE_QUANTITY};
pub use proof::{extract_tx_hash, PaymentProof};
pub use tolerance::{matches, DEFAULT_TOLERANCE, MAX_TOLERANCE, MIN_TOLERANCE};
