//! Protocol-wide constants

use crate::types::{Amount, Bps};

/// Decimal places of every ledger asset
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole token in micro-units
pub const TOKEN_UNIT: Amount = 1_000_000_000_000_000_000;

/// 100% in basis points
pub const BPS_DENOMINATOR: Bps = 10_000;

/// Decimal places emitted by the price feeds
pub const ORACLE_DECIMALS: u8 = 8;

/// Allowance value treated as unlimited; never decremented
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default accrual period for rates quoted per year
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Default maximum age of a price reading (1 hour)
pub const MAX_PRICE_AGE_SECS: u64 = 3_600;

/// Entries kept in each event and receipt journal; the oldest are dropped
pub const JOURNAL_CAPACITY: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_constants() {
        assert_eq!(TOKEN_UNIT, 10u128.pow(TOKEN_DECIMALS));
        assert_eq!(BPS_DENOMINATOR, 10_000);
        assert_eq!(SECONDS_PER_YEAR, 31_536_000);
    }
}
