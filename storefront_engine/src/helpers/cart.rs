//! The cart validator.
//!
//! Buyers submit orders in one of two request dialects: the legacy single-item form `{product_id, quantity}` or the
//! multi-item form `{items: [{product_id, quantity}, ...]}`. Both are normalised here, at the boundary, into one
//! canonical `Vec<CartLine>`; nothing downstream ever branches on the dialect again. This module performs no I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling on a single line's quantity.
pub const MAX_LINE_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Request must contain either 'product_id' and 'quantity', or a non-empty 'items' array")]
    EmptyCart,
    #[error("Field '{field}' must be a positive integer (got {value})")]
    InvalidQuantity { field: String, value: i64 },
    #[error("Field '{field}' exceeds the maximum quantity of {MAX_LINE_QUANTITY} (got {value})")]
    QuantityTooLarge { field: String, value: i64 },
}

/// One normalised cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self { product_id, quantity }
    }
}

/// The raw request shape. `Multi` is tried first so that a request carrying an `items` key is never mistaken for the
/// legacy form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CartRequest {
    Multi { items: Vec<CartLine> },
    Single { product_id: i64, quantity: i64 },
}

impl CartRequest {
    /// Normalise into a non-empty list of validated lines. Duplicate product ids are merged (quantities summed) so
    /// that downstream stock checks see one line per product.
    pub fn normalize(self) -> Result<Vec<CartLine>, CartError> {
        let raw = match self {
            CartRequest::Single { product_id, quantity } => vec![CartLine::new(product_id, quantity)],
            CartRequest::Multi { items } => items,
        };
        if raw.is_empty() {
            return Err(CartError::EmptyCart);
        }
        let mut lines: Vec<CartLine> = Vec::with_capacity(raw.len());
        for (i, line) in raw.iter().enumerate() {
            let field = format!("items[{i}].quantity");
            if line.quantity <= 0 {
                return Err(CartError::InvalidQuantity { field, value: line.quantity });
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(CartError::QuantityTooLarge { field, value: line.quantity });
            }
            match lines.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => existing.quantity += line.quantity,
                None => lines.push(*line),
            }
        }
        for line in &lines {
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(CartError::QuantityTooLarge {
                    field: format!("items[product_id={}].quantity", line.product_id),
                    value: line.quantity,
                });
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_item_dialect() {
        let req: CartRequest = serde_json::from_str(r#"{"product_id": 7, "quantity": 2}"#).unwrap();
        let lines = req.normalize().unwrap();
        assert_eq!(lines, vec![CartLine::new(7, 2)]);
    }

    #[test]
    fn multi_item_dialect() {
        let req: CartRequest =
            serde_json::from_str(r#"{"items": [{"product_id": 1, "quantity": 1}, {"product_id": 2, "quantity": 3}]}"#)
                .unwrap();
        let lines = req.normalize().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], CartLine::new(2, 3));
    }

    #[test]
    fn empty_items_rejected() {
        let req: CartRequest = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert_eq!(req.normalize(), Err(CartError::EmptyCart));
    }

    #[test]
    fn non_positive_quantity_rejected() {
        let req: CartRequest = serde_json::from_str(r#"{"product_id": 7, "quantity": 0}"#).unwrap();
        let err = req.normalize().unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity { value: 0, .. }));

        let req: CartRequest = serde_json::from_str(r#"{"items": [{"product_id": 1, "quantity": -4}]}"#).unwrap();
        let err = req.normalize().unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity { value: -4, ref field } if field == "items[0].quantity"));
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let req: CartRequest =
            serde_json::from_str(r#"{"items": [{"product_id": 1, "quantity": 2}, {"product_id": 1, "quantity": 3}]}"#)
                .unwrap();
        assert_eq!(req.normalize().unwrap(), vec![CartLine::new(1, 5)]);
    }

    #[test]
    fn ceiling_enforced() {
        let req: CartRequest = serde_json::from_str(r#"{"product_id": 7, "quantity": 10001}"#).unwrap();
        assert!(matches!(req.normalize(), Err(CartError::QuantityTooLarge { value: 10_001, .. })));
        let req: CartRequest = serde_json::from_str(r#"{"product_id": 7, "quantity": 10000}"#).unwrap();
        assert!(req.normalize().is_ok());
    }

    #[test]
    fn fractional_quantity_fails_at_deserialization() {
        assert!(serde_json::from_str::<CartRequest>(r#"{"product_id": 7, "quantity": 1.5}"#).is_err());
    }

    #[test]
    fn missing_both_dialects_fails() {
        assert!(serde_json::from_str::<CartRequest>(r#"{"note": "hello"}"#).is_err());
    }
}
