//! Shared numeric helpers for the capital invariants. All capital amounts
//! are rounded to a fixed 6-decimal precision and compared with a small
//! absolute tolerance.

/// Floating-point tolerance for the exact-capital invariant.
pub const CAPITAL_EPSILON: f64 = 1e-6;

/// Decimal places for finalized capital amounts.
pub const CAPITAL_DECIMALS: u32 = 6;

/// Round to `dp` decimal places.
pub fn round_dp(x: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (x * factor).round() / factor
}

/// Round a capital amount to the fixed precision.
pub fn round_capital(x: f64) -> f64 {
    round_dp(x, CAPITAL_DECIMALS)
}

/// Equality within the capital tolerance.
pub fn within_epsilon(a: f64, b: f64) -> bool {
    (a - b).abs() <= CAPITAL_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_six_places() {
        assert!((round_capital(1.23456789) - 1.234568).abs() < 1e-12);
        assert!((round_capital(5.2941176470) - 5.294118).abs() < 1e-12);
    }

    #[test]
    fn round_dp_handles_small_dp() {
        assert!((round_dp(3.14159, 2) - 3.14).abs() < 1e-12);
        assert!((round_dp(-0.005, 2) + 0.01).abs() < 1e-12);
    }

    #[test]
    fn epsilon_comparison() {
        assert!(within_epsilon(10.0, 10.0 + 5e-7));
        assert!(!within_epsilon(10.0, 10.0 + 2e-6));
    }
}
