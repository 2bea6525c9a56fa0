//! Range and precision limits for quantities and costs.
//!
//! Quantities are stored as `NUMERIC(15,3)` and costs as `NUMERIC(12,2)`.
//! Values finer or larger than that are rejected up front so both backends
//! keep identical balances and no arithmetic on a stored value can overflow.

use crate::error::{LedgerError, LedgerResult};
use rust_decimal::Decimal;

/// Decimal places kept for quantities and stock levels
pub const QUANTITY_SCALE: u32 = 3;
/// Decimal places kept for unit costs
pub const COST_SCALE: u32 = 2;

/// Exclusive magnitude bound for quantities (10^12)
pub fn quantity_limit() -> Decimal {
    Decimal::from(1_000_000_000_000_i64)
}

/// Exclusive magnitude bound for unit costs (10^10)
pub fn cost_limit() -> Decimal {
    Decimal::from(10_000_000_000_i64)
}

fn check(field: &str, value: Decimal, scale: u32, limit: Decimal) -> LedgerResult<Decimal> {
    if value.normalize().scale() > scale {
        return Err(LedgerError::Validation(format!(
            "{field} allows at most {scale} decimal places, got {value}"
        )));
    }
    if value.abs() >= limit {
        return Err(LedgerError::Validation(format!(
            "{field} is out of range: {value}"
        )));
    }
    Ok(value)
}

pub(crate) fn check_quantity(field: &str, value: Decimal) -> LedgerResult<Decimal> {
    check(field, value, QUANTITY_SCALE, quantity_limit())
}

pub(crate) fn check_cost(field: &str, value: Decimal) -> LedgerResult<Decimal> {
    check(field, value, COST_SCALE, cost_limit())
}

/// Balance after applying `delta` to `current`, or a validation error if it
/// would leave the storable range.
pub(crate) fn next_balance(current: Decimal, delta: Decimal) -> LedgerResult<Decimal> {
    let balance = current
        .checked_add(delta)
        .ok_or_else(|| LedgerError::Validation(format!("{current} + {delta} overflows")))?;
    check_quantity("resulting quantity", balance)
}

/// `min_stock_level * factor`, rounded to quantity precision
pub(crate) fn derived_level(field: &str, min_stock_level: Decimal, factor: Decimal) -> LedgerResult<Decimal> {
    let level = min_stock_level
        .checked_mul(factor)
        .ok_or_else(|| LedgerError::Validation(format!("{field} is out of range")))?
        .round_dp(QUANTITY_SCALE);
    check_quantity(field, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_precision() {
        assert!(check_quantity("quantity", Decimal::new(1_234, 3)).is_ok());
        // Trailing zeros do not count against the scale.
        assert!(check_quantity("quantity", Decimal::new(15_000, 4)).is_ok());
        assert!(check_quantity("quantity", Decimal::new(15, 4)).is_err());
    }

    #[test]
    fn test_quantity_range() {
        let below = quantity_limit() - Decimal::new(1, 3);
        assert!(check_quantity("quantity", below).is_ok());
        assert!(check_quantity("quantity", -below).is_ok());
        assert!(check_quantity("quantity", quantity_limit()).is_err());
        assert!(check_quantity("quantity", -quantity_limit()).is_err());
        assert!(check_quantity("quantity", Decimal::MAX).is_err());
    }

    #[test]
    fn test_cost_limits() {
        assert!(check_cost("current_cost", Decimal::new(4550, 2)).is_ok());
        assert!(check_cost("current_cost", Decimal::new(4555, 3)).is_err());
        assert!(check_cost("current_cost", cost_limit()).is_err());
    }

    #[test]
    fn test_next_balance_overflow_is_validation() {
        let err = next_balance(Decimal::MAX, Decimal::ONE).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let top = quantity_limit() - Decimal::ONE;
        assert!(matches!(
            next_balance(top, Decimal::ONE),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(next_balance(Decimal::from(5), Decimal::from(-10)).unwrap(), Decimal::from(-5));
    }

    #[test]
    fn test_derived_level_rounds_and_bounds() {
        let reorder = derived_level("reorder_level", Decimal::new(1, 3), Decimal::new(15, 1)).unwrap();
        assert_eq!(reorder, Decimal::new(2, 3));
        assert!(derived_level("max_stock_level", Decimal::MAX, Decimal::from(3)).is_err());
        assert!(derived_level("max_stock_level", quantity_limit() / Decimal::from(2), Decimal::from(3)).is_err());
    }
}
