mod money;

pub mod op;
mod secret;

mod helpers;

pub use helpers::parse_boolean_flag;
pub use money::{CryptoAmount, MoneyConversionError, UsdAmount, USD_CURRENCY_CODE};
pub use secret::Secret;
