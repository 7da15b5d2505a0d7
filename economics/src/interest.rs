//! Simple-interest accrual
//!
//! Interest is carried as the exact numerator `principal * rate_bps * seconds`
//! and only divided by `10_000 * period_secs` when read. Segments with
//! different principals add up without intermediate rounding, so how often
//! an account is accrued never changes what it earns or owes.

use serde::{Deserialize, Serialize};
use tokenomics_core::math::{TryAdd, TryMul, TrySub};
use tokenomics_core::{Amount, Bps, ProtocolError, Result, BPS_DENOMINATOR};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestAccrual {
    numerator: u128,
}

impl InterestAccrual {
    pub fn new() -> Self {
        Self::default()
    }

    /// `10_000 * period_secs`
    pub fn denominator(period_secs: u64) -> Result<u128> {
        if period_secs == 0 {
            return Err(ProtocolError::InvalidConfig(
                "interest period must be greater than 0".to_string(),
            ));
        }
        u128::from(BPS_DENOMINATOR).try_mul(u128::from(period_secs), "interest denominator")
    }

    /// Add `elapsed_secs` of interest on `principal` at `rate_bps`
    pub fn accrue(&mut self, principal: Amount, rate_bps: Bps, elapsed_secs: u64) -> Result<()> {
        let segment = principal
            .try_mul(u128::from(rate_bps), "interest accrual")?
            .try_mul(u128::from(elapsed_secs), "interest accrual")?;
        self.numerator = self.numerator.try_add(segment, "interest accrual")?;
        Ok(())
    }

    /// Accrued interest floored to whole micro-units
    pub fn whole_units(&self, period_secs: u64) -> Result<Amount> {
        Ok(self.numerator / Self::denominator(period_secs)?)
    }

    /// Remove `units` of paid interest
    pub fn settle(&mut self, units: Amount, period_secs: u64) -> Result<()> {
        let paid = units.try_mul(Self::denominator(period_secs)?, "interest settlement")?;
        self.numerator = self.numerator.try_sub(paid, "interest settlement")?;
        Ok(())
    }

    /// Drop the sub-unit remainder left once everything payable is paid
    pub fn forgive_remainder(&mut self) {
        self.numerator = 0;
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }
}

/// `floor(principal * rate_bps * elapsed / (10_000 * period))`
pub fn simple_interest(
    principal: Amount,
    rate_bps: Bps,
    elapsed_secs: u64,
    period_secs: u64,
) -> Result<Amount> {
    let mut accrual = InterestAccrual::new();
    accrual.accrue(principal, rate_bps, elapsed_secs)?;
    accrual.whole_units(period_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_interest() {
        // 1000 at 90% per 10-second period, after 11 seconds
        assert_eq!(simple_interest(1_000, 9_000, 11, 10).unwrap(), 990);
        assert_eq!(simple_interest(1_000, 9_000, 10, 10).unwrap(), 900);
        assert_eq!(simple_interest(1_000, 9_000, 0, 10).unwrap(), 0);
    }

    #[test]
    fn test_piecewise_has_no_intermediate_rounding() {
        // 1 unit at 1 bps: each second is 1/100_000 of a unit
        let mut accrual = InterestAccrual::new();
        for _ in 0..100_000 {
            accrual.accrue(1, 1, 1).unwrap();
        }
        assert_eq!(accrual.whole_units(10).unwrap(), 1);
    }

    #[test]
    fn test_settle_keeps_remainder() {
        let mut accrual = InterestAccrual::new();
        accrual.accrue(1_000, 9_000, 11).unwrap();
        accrual.accrue(1, 1, 1).unwrap();
        accrual.settle(990, 10).unwrap();
        assert_eq!(accrual.whole_units(10).unwrap(), 0);
        assert_eq!(accrual.numerator(), 1);

        assert!(accrual.settle(1, 10).is_err());
        accrual.forgive_remainder();
        assert_eq!(accrual.numerator(), 0);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            simple_interest(1, 1, 1, 0),
            Err(ProtocolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overflow_is_fatal() {
        let err = simple_interest(u128::MAX, 2, 1, 1).unwrap_err();
        assert!(err.is_fatal());
    }

    proptest! {
        #[test]
        fn interest_is_monotonic_in_time(
            principal in 0u128..1_000_000_000_000_000_000_000_000,
            rate in 0u32..=10_000,
            t1 in 0u64..400_000_000,
            dt in 0u64..400_000_000,
            period in 1u64..40_000_000,
        ) {
            let early = simple_interest(principal, rate, t1, period).unwrap();
            let late = simple_interest(principal, rate, t1 + dt, period).unwrap();
            prop_assert!(late >= early);
        }

        #[test]
        fn split_accrual_equals_single(
            principal in 0u128..1_000_000_000_000_000_000_000,
            rate in 0u32..=10_000,
            a in 0u64..10_000_000,
            b in 0u64..10_000_000,
        ) {
            let mut split = InterestAccrual::new();
            split.accrue(principal, rate, a).unwrap();
            split.accrue(principal, rate, b).unwrap();
            let mut single = InterestAccrual::new();
            single.accrue(principal, rate, a + b).unwrap();
            prop_assert_eq!(split, single);
        }
    }
}
