//! Stake-collateralized lending of a second asset
//!
//! The borrow limit is a percentage of the borrower's active stake valued in
//! the borrowed asset through two fresh oracle readings. Debt accrues simple
//! interest on the outstanding principal; repayments cover interest first.

use crate::interest::InterestAccrual;
use crate::staking::StakingEngine;
use crate::{check_bps, journal, require_admin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokenomics_core::math::{apply_bps, mul_div_floor, TryAdd, TrySub};
use tokenomics_core::{AccountId, Amount, AssetId, Bps, Ledger, ProtocolError, Result, Timestamp};
use tokenomics_oracle::{PriceOracle, PricePair};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Open,
    Closed,
}

/// Stake backing a loan, as valued when the loan opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralRef {
    pub staker: AccountId,
    pub principal: Amount,
    pub value_in_borrowed: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub borrower: AccountId,
    pub principal: Amount,
    pub principal_outstanding: Amount,
    pub accrued: InterestAccrual,
    pub rate_bps: Bps,
    pub percent_bps: Bps,
    pub opened_at: Timestamp,
    pub last_accrual: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub collateral: CollateralRef,
    pub status: LoanStatus,
    pub repaid: Amount,
}

impl LoanRecord {
    fn accrue_to(&mut self, now: Timestamp) -> Result<()> {
        let elapsed = now.saturating_sub(self.last_accrual);
        self.accrued
            .accrue(self.principal_outstanding, self.rate_bps, elapsed)?;
        self.last_accrual = self.last_accrual.max(now);
        Ok(())
    }

    fn debt(&self, period_secs: u64) -> Result<Amount> {
        self.principal_outstanding
            .try_add(self.accrued.whole_units(period_secs)?, "loan debt")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayReceipt {
    pub borrower: AccountId,
    pub amount: Amount,
    pub interest_paid: Amount,
    pub principal_paid: Amount,
    pub remaining: Amount,
    pub closed: bool,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingEngine {
    borrowed_asset: AssetId,
    collateral_pair: PricePair,
    borrowed_pair: PricePair,
    reserve_holder: AccountId,
    spender: AccountId,
    admin: AccountId,
    interest_rate_bps: Bps,
    max_lending_percent_bps: Bps,
    period_length_secs: u64,
    loans: BTreeMap<AccountId, LoanRecord>,
    closed: VecDeque<LoanRecord>,
}

impl LendingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        borrowed_asset: AssetId,
        collateral_pair: PricePair,
        borrowed_pair: PricePair,
        reserve_holder: AccountId,
        spender: AccountId,
        admin: AccountId,
        interest_rate_bps: Bps,
        max_lending_percent_bps: Bps,
        period_length_secs: u64,
    ) -> Result<Self> {
        check_bps(interest_rate_bps)?;
        check_bps(max_lending_percent_bps)?;
        if period_length_secs == 0 {
            return Err(ProtocolError::InvalidConfig(
                "lending period length must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            borrowed_asset,
            collateral_pair,
            borrowed_pair,
            reserve_holder,
            spender,
            admin,
            interest_rate_bps,
            max_lending_percent_bps,
            period_length_secs,
            loans: BTreeMap::new(),
            closed: VecDeque::new(),
        })
    }

    pub fn borrowed_asset(&self) -> &AssetId {
        &self.borrowed_asset
    }

    pub fn reserve_holder(&self) -> &AccountId {
        &self.reserve_holder
    }

    /// Identity the reserve holder must grant a borrowed-asset allowance to
    pub fn spender(&self) -> &AccountId {
        &self.spender
    }

    pub fn interest_rate_bps(&self) -> Bps {
        self.interest_rate_bps
    }

    pub fn max_lending_percent_bps(&self) -> Bps {
        self.max_lending_percent_bps
    }

    pub fn period_length_secs(&self) -> u64 {
        self.period_length_secs
    }

    pub fn loan_of(&self, account: &AccountId) -> Option<&LoanRecord> {
        self.loans.get(account)
    }

    pub fn has_open_loan(&self, account: &AccountId) -> bool {
        self.loans.contains_key(account)
    }

    pub fn open_loans(&self) -> impl Iterator<Item = &LoanRecord> {
        self.loans.values()
    }

    pub fn closed_loans(&self) -> &VecDeque<LoanRecord> {
        &self.closed
    }

    fn open_record(&self, account: &AccountId) -> Result<&LoanRecord> {
        self.loans
            .get(account)
            .ok_or_else(|| ProtocolError::NoOpenLoan(account.clone()))
    }

    /// Active stake principal converted into the borrowed asset:
    /// `floor(principal * collateral_usd / borrowed_usd)`
    pub fn staked_value_in_borrowed<O: PriceOracle>(
        &self,
        oracle: &O,
        staking: &StakingEngine,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        let collateral = oracle.latest_price(&self.collateral_pair, now)?.price_wad()?;
        let borrowed = oracle.latest_price(&self.borrowed_pair, now)?.price_wad()?;
        let principal = staking.staked_principal(account);
        let value = mul_div_floor(principal, collateral, borrowed, "staked value")?;
        debug!(%account, principal, collateral, borrowed, value, "staked value");
        Ok(value)
    }

    pub fn get_borrow_limit<O: PriceOracle>(
        &self,
        oracle: &O,
        staking: &StakingEngine,
        account: &AccountId,
        percent_bps: Bps,
        now: Timestamp,
    ) -> Result<Amount> {
        self.check_percent(percent_bps)?;
        let value = self.staked_value_in_borrowed(oracle, staking, account, now)?;
        apply_bps(value, percent_bps)
    }

    fn check_percent(&self, percent_bps: Bps) -> Result<()> {
        if percent_bps > self.max_lending_percent_bps {
            return Err(ProtocolError::PercentExceedsMax {
                requested: percent_bps,
                max: self.max_lending_percent_bps,
            });
        }
        if percent_bps == 0 {
            return Err(ProtocolError::InvalidAmount(
                "lending percent must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Borrow `percent_bps` of the staked value; returns the disbursed amount
    pub fn open_loan<L: Ledger, O: PriceOracle>(
        &mut self,
        ledger: &mut L,
        oracle: &O,
        staking: &StakingEngine,
        account: &AccountId,
        percent_bps: Bps,
        now: Timestamp,
    ) -> Result<Amount> {
        if self.has_open_loan(account) {
            return Err(ProtocolError::LoanAlreadyOpen(account.clone()));
        }
        self.check_percent(percent_bps)?;
        let value = self.staked_value_in_borrowed(oracle, staking, account, now)?;
        let amount = apply_bps(value, percent_bps)?;
        if amount == 0 {
            return Err(ProtocolError::InsufficientCollateral(account.clone()));
        }
        let available = ledger.balance_of(&self.borrowed_asset, &self.reserve_holder);
        if available < amount {
            return Err(ProtocolError::InsufficientReserve {
                required: amount,
                available,
            });
        }

        let collateral = CollateralRef {
            staker: account.clone(),
            principal: staking.staked_principal(account),
            value_in_borrowed: value,
        };

        ledger.transfer_from(
            &self.borrowed_asset,
            &self.reserve_holder,
            &self.spender,
            account,
            amount,
        )?;

        self.loans.insert(
            account.clone(),
            LoanRecord {
                borrower: account.clone(),
                principal: amount,
                principal_outstanding: amount,
                accrued: InterestAccrual::new(),
                rate_bps: self.interest_rate_bps,
                percent_bps,
                opened_at: now,
                last_accrual: now,
                closed_at: None,
                collateral,
                status: LoanStatus::Open,
                repaid: 0,
            },
        );

        info!(%account, amount, percent_bps, rate_bps = self.interest_rate_bps, "loan opened");
        Ok(amount)
    }

    /// Read-only debt at `now`
    pub fn total_debt(&self, account: &AccountId, now: Timestamp) -> Result<Amount> {
        let mut record = self.open_record(account)?.clone();
        record.accrue_to(now)?;
        record.debt(self.period_length_secs)
    }

    /// Fold interest up to `now` into the record and return the debt
    pub fn accrue_and_get_total_debt(&mut self, account: &AccountId, now: Timestamp) -> Result<Amount> {
        let mut record = self.open_record(account)?.clone();
        record.accrue_to(now)?;
        let debt = record.debt(self.period_length_secs)?;
        self.loans.insert(account.clone(), record);
        debug!(%account, debt, "debt accrued");
        Ok(debt)
    }

    pub fn repay<L: Ledger>(
        &mut self,
        ledger: &mut L,
        account: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<RepayReceipt> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount(
                "repayment must be greater than 0".to_string(),
            ));
        }
        let period = self.period_length_secs;
        let mut record = self.open_record(account)?.clone();
        record.accrue_to(now)?;

        let interest = record.accrued.whole_units(period)?;
        let outstanding = record.principal_outstanding.try_add(interest, "loan debt")?;
        if amount > outstanding {
            return Err(ProtocolError::ExceedsOutstandingDebt {
                amount,
                outstanding,
            });
        }

        let interest_paid = amount.min(interest);
        let principal_paid = amount - interest_paid;
        record.accrued.settle(interest_paid, period)?;
        record.principal_outstanding = record
            .principal_outstanding
            .try_sub(principal_paid, "loan principal")?;
        record.repaid = record.repaid.try_add(amount, "loan repaid")?;

        ledger.transfer(&self.borrowed_asset, account, &self.reserve_holder, amount)?;

        let remaining = outstanding - amount;
        let closed = remaining == 0;
        if closed {
            record.accrued.forgive_remainder();
            record.status = LoanStatus::Closed;
            record.closed_at = Some(now);
            self.loans.remove(account);
            journal(&mut self.closed, record);
            info!(%account, amount, "loan closed");
        } else {
            self.loans.insert(account.clone(), record);
            info!(%account, amount, remaining, "loan partially repaid");
        }

        Ok(RepayReceipt {
            borrower: account.clone(),
            amount,
            interest_paid,
            principal_paid,
            remaining,
            closed,
            at: now,
        })
    }

    /// Repay the whole debt at `now` and close the loan
    pub fn repay_in_full<L: Ledger>(
        &mut self,
        ledger: &mut L,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<RepayReceipt> {
        let debt = self.total_debt(account, now)?;
        self.repay(ledger, account, debt, now)
    }

    /// Applies to loans opened afterwards
    pub fn set_interest_rate(&mut self, caller: &AccountId, rate_bps: Bps) -> Result<()> {
        require_admin(&self.admin, caller)?;
        check_bps(rate_bps)?;
        self.interest_rate_bps = rate_bps;
        info!(rate_bps, "lending interest rate updated");
        Ok(())
    }

    pub fn set_max_lending_percent(&mut self, caller: &AccountId, percent_bps: Bps) -> Result<()> {
        require_admin(&self.admin, caller)?;
        check_bps(percent_bps)?;
        self.max_lending_percent_bps = percent_bps;
        info!(percent_bps, "max lending percent updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenomics_core::TokenLedger;
    use tokenomics_oracle::PriceFeeds;

    struct Fixture {
        ledger: TokenLedger,
        feeds: PriceFeeds,
        staking: StakingEngine,
        lending: LendingEngine,
        bob: AccountId,
    }

    fn fixture() -> Fixture {
        let tkn = AssetId::new("TKN");
        let link = AssetId::new("LINK");
        let bob = AccountId::new("bob");
        let admin = AccountId::new("admin");
        let reserve = AccountId::new("reserve");

        let mut ledger = TokenLedger::new();
        ledger.create_asset(&tkn, &bob, 1_000_000).unwrap();
        ledger.create_asset(&link, &reserve, 1_000_000).unwrap();

        let mut feeds = PriceFeeds::new(60);
        feeds.register(PricePair::usd("ETH"), 8).unwrap();
        feeds.register(PricePair::usd("LINK"), 8).unwrap();
        feeds.publish(&PricePair::usd("ETH"), 130_000_000_000, 0).unwrap();
        feeds.publish(&PricePair::usd("LINK"), 800_000_000, 0).unwrap();

        let mut staking =
            StakingEngine::new(tkn.clone(), AccountId::new("staking"), admin.clone(), 0, 0, 10)
                .unwrap();
        ledger.approve(&tkn, &bob, staking.custody(), 1_000).unwrap();
        staking.stake(&mut ledger, &bob, 1_000, 0).unwrap();

        let lending = LendingEngine::new(
            link.clone(),
            PricePair::usd("ETH"),
            PricePair::usd("LINK"),
            reserve.clone(),
            AccountId::new("lending"),
            admin,
            1_000,
            7_000,
            10,
        )
        .unwrap();
        ledger
            .approve(&link, &reserve, lending.spender(), 1_000_000)
            .unwrap();

        Fixture {
            ledger,
            feeds,
            staking,
            lending,
            bob,
        }
    }

    #[test]
    fn test_staked_value_and_limit() {
        let f = fixture();
        assert_eq!(
            f.lending
                .staked_value_in_borrowed(&f.feeds, &f.staking, &f.bob, 0)
                .unwrap(),
            162_500
        );
        assert_eq!(
            f.lending
                .get_borrow_limit(&f.feeds, &f.staking, &f.bob, 7_000, 0)
                .unwrap(),
            113_750
        );
        assert_eq!(
            f.lending.get_borrow_limit(&f.feeds, &f.staking, &f.bob, 7_001, 0),
            Err(ProtocolError::PercentExceedsMax {
                requested: 7_001,
                max: 7_000,
            })
        );
    }

    #[test]
    fn test_open_loan_disburses() {
        let mut f = fixture();
        let amount = f
            .lending
            .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0)
            .unwrap();
        assert_eq!(amount, 81_250);
        assert_eq!(f.ledger.balance_of(&AssetId::new("LINK"), &f.bob), 81_250);

        let loan = f.lending.loan_of(&f.bob).unwrap();
        assert_eq!(loan.status, LoanStatus::Open);
        assert_eq!(loan.collateral.value_in_borrowed, 162_500);

        assert_eq!(
            f.lending
                .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 1_000, 1),
            Err(ProtocolError::LoanAlreadyOpen(f.bob.clone()))
        );
    }

    #[test]
    fn test_open_loan_without_stake() {
        let mut f = fixture();
        let carol = AccountId::new("carol");
        assert_eq!(
            f.lending
                .open_loan(&mut f.ledger, &f.feeds, &f.staking, &carol, 5_000, 0),
            Err(ProtocolError::InsufficientCollateral(carol))
        );
    }

    #[test]
    fn test_open_loan_reserve_and_allowance() {
        let mut f = fixture();
        let link = AssetId::new("LINK");
        let reserve = AccountId::new("reserve");
        f.ledger
            .approve(&link, &reserve, f.lending.spender(), 10)
            .unwrap();
        assert!(matches!(
            f.lending
                .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0),
            Err(ProtocolError::InsufficientAllowance { .. })
        ));

        f.ledger
            .transfer(&link, &reserve, &AccountId::new("elsewhere"), 999_990)
            .unwrap();
        assert_eq!(
            f.lending
                .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0),
            Err(ProtocolError::InsufficientReserve {
                required: 81_250,
                available: 10,
            })
        );
        assert!(!f.lending.has_open_loan(&f.bob));
    }

    #[test]
    fn test_stale_price_blocks_loan() {
        let mut f = fixture();
        assert!(matches!(
            f.lending
                .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 61),
            Err(ProtocolError::StalePrice { .. })
        ));
    }

    #[test]
    fn test_debt_accrues_and_repays_interest_first() {
        let mut f = fixture();
        f.lending
            .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0)
            .unwrap();

        // 81_250 at 10% per 10s: 8_125 after a full period
        assert_eq!(f.lending.total_debt(&f.bob, 10).unwrap(), 89_375);
        assert_eq!(f.lending.accrue_and_get_total_debt(&f.bob, 10).unwrap(), 89_375);

        let receipt = f.lending.repay(&mut f.ledger, &f.bob, 10_000, 10).unwrap();
        assert_eq!(receipt.interest_paid, 8_125);
        assert_eq!(receipt.principal_paid, 1_875);
        assert_eq!(receipt.remaining, 79_375);
        assert!(!receipt.closed);
        assert_eq!(
            f.ledger.balance_of(&AssetId::new("LINK"), &AccountId::new("reserve")),
            1_000_000 - 81_250 + 10_000
        );
    }

    #[test]
    fn test_two_step_repay_closes_loan() {
        let mut f = fixture();
        let link = AssetId::new("LINK");
        f.ledger
            .transfer(&link, &AccountId::new("reserve"), &f.bob, 50_000)
            .unwrap();
        f.lending
            .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 7_000, 0)
            .unwrap();

        f.lending.repay(&mut f.ledger, &f.bob, 333, 3).unwrap();
        let remaining = f.lending.total_debt(&f.bob, 7).unwrap();
        let receipt = f.lending.repay(&mut f.ledger, &f.bob, remaining, 7).unwrap();

        assert!(receipt.closed);
        assert_eq!(receipt.remaining, 0);
        assert!(!f.lending.has_open_loan(&f.bob));
        let closed = &f.lending.closed_loans()[0];
        assert_eq!(closed.status, LoanStatus::Closed);
        assert_eq!(closed.principal_outstanding, 0);
        assert_eq!(closed.accrued.numerator(), 0);
        assert_eq!(closed.closed_at, Some(7));
    }

    #[test]
    fn test_repay_errors() {
        let mut f = fixture();
        assert_eq!(
            f.lending.repay(&mut f.ledger, &f.bob, 1, 0),
            Err(ProtocolError::NoOpenLoan(f.bob.clone()))
        );
        f.lending
            .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0)
            .unwrap();
        assert_eq!(
            f.lending.repay(&mut f.ledger, &f.bob, 81_251, 0),
            Err(ProtocolError::ExceedsOutstandingDebt {
                amount: 81_251,
                outstanding: 81_250,
            })
        );
        assert!(matches!(
            f.lending.repay(&mut f.ledger, &f.bob, 0, 0),
            Err(ProtocolError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_repay_in_full() {
        let mut f = fixture();
        let link = AssetId::new("LINK");
        f.ledger
            .transfer(&link, &AccountId::new("reserve"), &f.bob, 50_000)
            .unwrap();
        f.lending
            .open_loan(&mut f.ledger, &f.feeds, &f.staking, &f.bob, 5_000, 0)
            .unwrap();
        let receipt = f.lending.repay_in_full(&mut f.ledger, &f.bob, 13).unwrap();
        assert!(receipt.closed);
        assert_eq!(receipt.amount, 81_250 + 10_562);
    }

    #[test]
    fn test_admin_setters() {
        let mut f = fixture();
        let admin = AccountId::new("admin");
        assert_eq!(
            f.lending.set_max_lending_percent(&f.bob, 9_000),
            Err(ProtocolError::Unauthorized(f.bob.clone()))
        );
        assert!(matches!(
            f.lending.set_interest_rate(&admin, 10_001),
            Err(ProtocolError::PercentOutOfBounds { .. })
        ));
        f.lending.set_max_lending_percent(&admin, 9_000).unwrap();
        f.lending.set_interest_rate(&admin, 125).unwrap();
        assert_eq!(f.lending.max_lending_percent_bps(), 9_000);
        assert_eq!(f.lending.interest_rate_bps(), 125);
    }
}
