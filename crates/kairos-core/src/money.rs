//! Currency codes and amounts in minor units.

use crate::error::{CoreError, CoreResult};

/// ## Summary
/// Normalizes an ISO-4217 style currency code to upper case.
///
/// ## Errors
/// Returns a validation error unless the code is exactly three ASCII letters.
pub fn normalize_currency(code: &str) -> CoreResult<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(CoreError::ValidationError(format!(
            "invalid currency code '{code}'"
        )))
    }
}

/// ## Summary
/// Multiplies a per-seat price, failing instead of wrapping.
///
/// ## Errors
/// Returns an invariant violation on overflow.
pub fn total_for_seats(price: i64, seats: usize) -> CoreResult<i64> {
    i64::try_from(seats)
        .ok()
        .and_then(|seats| price.checked_mul(seats))
        .ok_or(CoreError::InvariantViolation("payment amount overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("usd").ok().as_deref(), Some("USD"));
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("U5D").is_err());
    }

    #[test]
    fn test_total_for_seats() {
        assert_eq!(total_for_seats(1000, 3).ok(), Some(3000));
        assert!(total_for_seats(i64::MAX, 2).is_err());
    }
}
