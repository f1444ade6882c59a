//! The tolerance evaluator.
//!
//! On-chain fee deduction and wallet rounding can make the literal transferred amount a few basis points below the
//! nominal invoice amount. A payment matches when `|observed - expected| <= expected * tolerance`, with the tolerance
//! fraction clamped into [`MIN_TOLERANCE`, `MAX_TOLERANCE`].
//!
//! The check runs both when a payment is first confirmed and again on every polling re-check, so it must be
//! deterministic: the comparison is done in integer parts-per-million on base units, never in floats.

use storefront_common::CryptoAmount;

/// 0.5%, the platform default.
pub const DEFAULT_TOLERANCE: f64 = 0.005;
pub const MIN_TOLERANCE: f64 = 0.0001;
pub const MAX_TOLERANCE: f64 = 1.0;

const PPM: u128 = 1_000_000;

/// Returns true iff `observed` is within the (clamped) relative tolerance band around `expected`.
/// `tolerance` defaults to [`DEFAULT_TOLERANCE`] when `None`.
pub fn matches(observed: CryptoAmount, expected: CryptoAmount, tolerance: Option<f64>) -> bool {
    let tol = tolerance.unwrap_or(DEFAULT_TOLERANCE).clamp(MIN_TOLERANCE, MAX_TOLERANCE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tol_ppm = (tol * PPM as f64).round() as u128;
    let observed = observed.value();
    let expected = expected.value();
    if expected < 0 || observed < 0 {
        return false;
    }
    let diff = observed.abs_diff(expected) as u128;
    diff * PPM <= expected as u128 * tol_ppm
}
