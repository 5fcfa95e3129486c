//! Canonical margin arithmetic shared by risk checks and liquidation.

/// Initial margin a position of `notional` locks at `max_leverage`.
pub fn initial_margin_required(notional: f64, max_leverage: f64) -> f64 {
    notional / max_leverage.max(1e-12)
}

/// Free margin remaining after locking margin for a new notional.
pub fn free_margin_after(free_margin: f64, notional: f64, max_leverage: f64) -> f64 {
    free_margin - initial_margin_required(notional, max_leverage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_scales_inverse_to_leverage() {
        assert_eq!(initial_margin_required(10_000.0, 2.0), 5_000.0);
        assert_eq!(initial_margin_required(10_000.0, 10.0), 1_000.0);
    }

    #[test]
    fn free_margin_after_locks_initial_margin() {
        assert_eq!(free_margin_after(6_000.0, 10_000.0, 2.0), 1_000.0);
    }
}
