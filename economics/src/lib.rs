//! Tokenomics Economics Module
//!
//! Implements the economic protocol on top of the core ledger:
//! - Oracle-priced token sale
//! - Time-locked staking with simple interest
//! - Stake-collateralized lending of a second asset
//! - Supply audit and the serialized `TokenEconomy` facade

pub mod config;
pub mod economy;
pub mod interest;
pub mod lending;
pub mod pricing;
pub mod staking;
pub mod supply;

pub use config::{
    FeedConfig, LendingConfig, OracleConfig, ProtocolConfig, SaleConfig, StakingConfig,
    TokenConfig,
};
pub use economy::{EconomyState, TokenEconomy};
pub use interest::{simple_interest, InterestAccrual};
pub use lending::{CollateralRef, LendingEngine, LoanRecord, LoanStatus, RepayReceipt};
pub use pricing::{PriceCalculator, PurchaseReceipt, SaleEngine};
pub use staking::{ClaimReceipt, StakeRecord, StakingEngine};
pub use supply::{SupplyReport, SupplyStats};

use std::collections::VecDeque;
use tokenomics_core::{AccountId, Bps, ProtocolError, Result, BPS_DENOMINATOR, JOURNAL_CAPACITY};

pub(crate) fn require_admin(admin: &AccountId, caller: &AccountId) -> Result<()> {
    if admin != caller {
        return Err(ProtocolError::Unauthorized(caller.clone()));
    }
    Ok(())
}

/// Append to a receipt journal, dropping the oldest entries past capacity
pub(crate) fn journal<T>(log: &mut VecDeque<T>, entry: T) {
    log.push_back(entry);
    while log.len() > JOURNAL_CAPACITY {
        log.pop_front();
    }
}

pub(crate) fn check_bps(value: Bps) -> Result<()> {
    if value > BPS_DENOMINATOR {
        return Err(ProtocolError::PercentOutOfBounds {
            value,
            max: BPS_DENOMINATOR,
        });
    }
    Ok(())
}
