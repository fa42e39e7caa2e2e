//! # Fixed-Point Math
//!
//! All vault arithmetic runs in unsigned 128-bit integers over a decimal
//! base. Nothing here ever wraps: every multiply is either headroom-checked
//! up front or performed with `checked_*`, and a failure surfaces as
//! [`VaultError::ArithmeticOverflow`].
//!
//! Division always floors. Callers that need a particular rounding bias
//! get it by choosing which side of the computation divides last.

use crate::config::MAX_POW10_EXPONENT;
use crate::error::{VaultError, VaultResult};

/// Returns `10^exp`, or an overflow error past `10^38`.
pub fn pow10(exp: u32) -> VaultResult<u128> {
    if exp > MAX_POW10_EXPONENT {
        return Err(VaultError::ArithmeticOverflow);
    }
    10u128.checked_pow(exp).ok_or(VaultError::ArithmeticOverflow)
}

/// Verifies that `a * b * 10^scale` fits in `u128`.
///
/// The check is `u128::MAX / 10^scale / a > b`. A zero operand always
/// passes.
pub fn check_headroom(a: u128, b: u128, scale: u32) -> VaultResult<()> {
    if a == 0 || b == 0 {
        return Ok(());
    }
    let limit = u128::MAX / pow10(scale)? / a;
    if limit > b {
        Ok(())
    } else {
        Err(VaultError::ArithmeticOverflow)
    }
}

/// Computes `a * b * 10^scale_mul / 10^scale_div` without intermediate
/// truncation. The single division happens last.
pub fn scaled_multiply_divide(a: u128, b: u128, scale_mul: u32, scale_div: u32) -> VaultResult<u128> {
    let product = a
        .checked_mul(b)
        .and_then(|p| p.checked_mul(pow10(scale_mul).ok()?))
        .ok_or(VaultError::ArithmeticOverflow)?;
    Ok(product / pow10(scale_div)?)
}

/// Guarded form of [`scaled_multiply_divide`]: runs [`check_headroom`]
/// before touching the operands.
pub fn guarded_scaled_multiply_divide(
    a: u128,
    b: u128,
    scale_mul: u32,
    scale_div: u32,
) -> VaultResult<u128> {
    check_headroom(a, b, scale_mul)?;
    scaled_multiply_divide(a, b, scale_mul, scale_div)
}

/// Computes `floor(a * b / c)`.
///
/// A zero divisor is reported as an overflow; callers that can legitimately
/// see a zero denominator handle that case before calling.
pub fn mul_div(a: u128, b: u128, c: u128) -> VaultResult<u128> {
    if c == 0 {
        return Err(VaultError::ArithmeticOverflow);
    }
    a.checked_mul(b)
        .map(|p| p / c)
        .ok_or(VaultError::ArithmeticOverflow)
}

/// Narrows a `u128` to `u64`.
pub fn to_u64(value: u128) -> VaultResult<u64> {
    u64::try_from(value).map_err(|_| VaultError::ArithmeticOverflow)
}

/// Splits a net decimal exponent into `(scale_mul, scale_div)` so that a
/// positive exponent multiplies and a negative one divides.
pub fn split_exponent(net: i64) -> VaultResult<(u32, u32)> {
    let magnitude = u32::try_from(net.unsigned_abs()).map_err(|_| VaultError::ArithmeticOverflow)?;
    if net >= 0 {
        Ok((magnitude, 0))
    } else {
        Ok((0, magnitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow10_bounds() {
        assert_eq!(pow10(0).unwrap(), 1);
        assert_eq!(pow10(8).unwrap(), 100_000_000);
        assert!(pow10(38).is_ok());
        assert!(matches!(pow10(39), Err(VaultError::ArithmeticOverflow)));
    }

    #[test]
    fn scaled_multiply_divide_keeps_precision() {
        // 45 * 10^2 / 10^3 floors to 4.
        assert_eq!(scaled_multiply_divide(15, 3, 2, 3).unwrap(), 4);
        // Division happens last, so no intermediate truncation.
        assert_eq!(scaled_multiply_divide(1, 1, 8, 8).unwrap(), 1);
        assert_eq!(scaled_multiply_divide(7, 3, 0, 1).unwrap(), 2);
    }

    #[test]
    fn scaled_multiply_divide_overflow() {
        let result = scaled_multiply_divide(u128::MAX, 2, 0, 0);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow)));
        let result = scaled_multiply_divide(u128::MAX / 10, 1, 2, 0);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow)));
    }

    #[test]
    fn headroom_rejects_before_multiplying() {
        let a = u64::MAX as u128;
        let b = i64::MAX as u128;
        assert!(matches!(
            check_headroom(a, b, 8),
            Err(VaultError::ArithmeticOverflow)
        ));
        assert!(check_headroom(100_000_000, 300_000_000_000, 8).is_ok());
        assert!(check_headroom(0, u128::MAX, 8).is_ok());
    }

    #[test]
    fn guarded_variant_matches_plain_when_in_range() {
        let plain = scaled_multiply_divide(123_456, 789, 4, 2).unwrap();
        let guarded = guarded_scaled_multiply_divide(123_456, 789, 4, 2).unwrap();
        assert_eq!(plain, guarded);
    }

    #[test]
    fn mul_div_floors_and_guards_zero() {
        assert_eq!(mul_div(10, 10, 3).unwrap(), 33);
        assert!(matches!(mul_div(1, 1, 0), Err(VaultError::ArithmeticOverflow)));
        assert!(matches!(
            mul_div(u128::MAX, 2, 1),
            Err(VaultError::ArithmeticOverflow)
        ));
    }

    #[test]
    fn to_u64_narrowing() {
        assert_eq!(to_u64(42).unwrap(), 42);
        assert!(to_u64(u64::MAX as u128 + 1).is_err());
    }

    #[test]
    fn split_exponent_signs() {
        assert_eq!(split_exponent(5).unwrap(), (5, 0));
        assert_eq!(split_exponent(-8).unwrap(), (0, 8));
        assert_eq!(split_exponent(0).unwrap(), (0, 0));
    }
}
