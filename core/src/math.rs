//! Checked fixed-point arithmetic
//!
//! All protocol amounts are `u128` micro-units. Overflow never wraps: it
//! surfaces as `ProtocolError::ArithmeticOverflow` naming the computation.

use crate::constants::BPS_DENOMINATOR;
use crate::error::{ProtocolError, Result};
use crate::types::{Amount, Bps};

/// Try to add, return an error on overflow
pub trait TryAdd: Sized {
    fn try_add(self, rhs: Self, what: &'static str) -> Result<Self>;
}

/// Try to subtract, return an error on underflow
pub trait TrySub: Sized {
    fn try_sub(self, rhs: Self, what: &'static str) -> Result<Self>;
}

/// Try to multiply, return an error on overflow
pub trait TryMul: Sized {
    fn try_mul(self, rhs: Self, what: &'static str) -> Result<Self>;
}

impl TryAdd for u128 {
    fn try_add(self, rhs: Self, what: &'static str) -> Result<Self> {
        self.checked_add(rhs)
            .ok_or(ProtocolError::ArithmeticOverflow(what))
    }
}

impl TrySub for u128 {
    fn try_sub(self, rhs: Self, what: &'static str) -> Result<Self> {
        self.checked_sub(rhs)
            .ok_or(ProtocolError::ArithmeticOverflow(what))
    }
}

impl TryMul for u128 {
    fn try_mul(self, rhs: Self, what: &'static str) -> Result<Self> {
        self.checked_mul(rhs)
            .ok_or(ProtocolError::ArithmeticOverflow(what))
    }
}

/// `floor(a * b / d)`
pub fn mul_div_floor(a: u128, b: u128, d: u128, what: &'static str) -> Result<u128> {
    mul_div(a, b, d, false, what)
}

/// `ceil(a * b / d)`
pub fn mul_div_ceil(a: u128, b: u128, d: u128, what: &'static str) -> Result<u128> {
    mul_div(a, b, d, true, what)
}

fn mul_div(a: u128, b: u128, d: u128, round_up: bool, what: &'static str) -> Result<u128> {
    if d == 0 {
        return Err(ProtocolError::ArithmeticOverflow(what));
    }

    let (quotient, remainder) = match a.checked_mul(b) {
        Some(product) => (product / d, product % d),
        None => {
            let (high, low) = widening_mul(a, b);
            if high >= d {
                return Err(ProtocolError::ArithmeticOverflow(what));
            }
            div_wide(high, low, d)
        }
    };

    if round_up && remainder != 0 {
        quotient.try_add(1, what)
    } else {
        Ok(quotient)
    }
}

/// Full 256-bit product as `(high, low)` halves
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let low = (ll & MASK) | (mid << 64);
    let high = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (high, low)
}

/// `(high * 2^128 + low) / d` with `high < d`, so the quotient fits in u128
fn div_wide(high: u128, low: u128, d: u128) -> (u128, u128) {
    let mut quotient = 0u128;
    let mut rem = high;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    (quotient, rem)
}

/// `10^exp` as u128
pub fn pow10(exp: u32) -> Result<u128> {
    10u128
        .checked_pow(exp)
        .ok_or(ProtocolError::ArithmeticOverflow("pow10"))
}

/// Move a fixed-point value between decimal scales, flooring when narrowing
pub fn rescale(value: u128, from_decimals: u32, to_decimals: u32) -> Result<u128> {
    if to_decimals >= from_decimals {
        value.try_mul(pow10(to_decimals - from_decimals)?, "rescale")
    } else {
        Ok(value / pow10(from_decimals - to_decimals)?)
    }
}

/// `floor(amount * bps / 10_000)`
pub fn apply_bps(amount: Amount, bps: Bps) -> Result<Amount> {
    mul_div_floor(
        amount,
        u128::from(bps),
        u128::from(BPS_DENOMINATOR),
        "basis points",
    )
}

/// Parse a decimal string such as `"0.01"` into a value scaled by `10^decimals`
pub fn parse_units(input: &str, decimals: u32) -> Result<u128> {
    let input = input.trim();
    let invalid = || ProtocolError::InvalidAmount(format!("cannot parse {:?}", input));

    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits_only(whole) || !digits_only(fraction) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(ProtocolError::InvalidAmount(format!(
            "{:?} has more than {} decimal places",
            input, decimals
        )));
    }

    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| invalid())?
    };
    let mut fraction_value = 0u128;
    if !fraction.is_empty() {
        fraction_value = fraction.parse::<u128>().map_err(|_| invalid())?;
        fraction_value =
            fraction_value.try_mul(pow10(decimals - fraction.len() as u32)?, "parse_units")?;
    }

    whole_value
        .try_mul(pow10(decimals)?, "parse_units")?
        .try_add(fraction_value, "parse_units")
}

/// Render a scaled value back as a decimal string, trimming trailing zeros
pub fn format_units(value: u128, decimals: u32) -> String {
    let Ok(scale) = pow10(decimals) else {
        return value.to_string();
    };
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_floor(7, 3, 2, "t").unwrap(), 10);
        assert_eq!(mul_div_ceil(7, 3, 2, "t").unwrap(), 11);
        assert_eq!(mul_div_ceil(6, 3, 2, "t").unwrap(), 9);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 10^24 * 10^18 does not fit in u128, the quotient does
        let a = 10u128.pow(24);
        let b = 10u128.pow(18);
        let d = 6_188_118_811_881u128;
        assert_eq!(
            mul_div_floor(a, b, d, "t").unwrap(),
            161_600_000_000_004_912_640_000_000_149
        );
        assert_eq!(
            mul_div_ceil(a, b, d, "t").unwrap(),
            161_600_000_000_004_912_640_000_000_150
        );
    }

    #[test]
    fn test_mul_div_full_width() {
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, u128::MAX, "t").unwrap(), u128::MAX);
        assert_eq!(
            mul_div_floor(u128::MAX, 10u128.pow(30), 10u128.pow(30) + 7, "t").unwrap(),
            340_282_366_920_938_463_463_374_607_429_386_234_886
        );
        assert_eq!(
            mul_div_floor(u128::MAX, 2, 1, "t"),
            Err(ProtocolError::ArithmeticOverflow("t"))
        );
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert_eq!(
            mul_div_floor(1, 1, 0, "quote"),
            Err(ProtocolError::ArithmeticOverflow("quote"))
        );
    }

    #[test]
    fn test_checked_overflow() {
        assert!(u128::MAX.try_add(1, "credit").is_err());
        assert!(0u128.try_sub(1, "debit").is_err());
        assert_eq!(2u128.try_mul(3, "m").unwrap(), 6);
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(161_600_000_000, 8, 18).unwrap(), 1_616 * 10u128.pow(18));
        assert_eq!(rescale(1_999, 3, 0).unwrap(), 1);
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(1_000, 7_000).unwrap(), 700);
        assert_eq!(apply_bps(3, 5_000).unwrap(), 1);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("0.01", 18).unwrap(), 10u128.pow(16));
        assert_eq!(parse_units("1000000", 18).unwrap(), 10u128.pow(24));
        assert_eq!(parse_units("1.5", 2).unwrap(), 150);
        assert_eq!(parse_units(".5", 1).unwrap(), 5);
        assert!(parse_units("1.234", 2).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(10u128.pow(16), 18), "0.01");
        assert_eq!(format_units(10u128.pow(24), 18), "1000000");
        assert_eq!(format_units(161_600, 18), "0.0000000000001616");
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(v in any::<u64>(), decimals in 0u32..19) {
            let v = u128::from(v);
            prop_assert_eq!(parse_units(&format_units(v, decimals), decimals).unwrap(), v);
        }

        #[test]
        fn ceil_never_below_floor(a in any::<u64>(), b in any::<u64>(), d in 1u64..) {
            let (a, b, d) = (u128::from(a), u128::from(b), u128::from(d));
            let lo = mul_div_floor(a, b, d, "t").unwrap();
            let hi = mul_div_ceil(a, b, d, "t").unwrap();
            prop_assert!(hi == lo || hi == lo + 1);
            prop_assert!(lo * d <= a * b);
        }
    }
}
