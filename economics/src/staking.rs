//! Time-locked staking with simple interest
//!
//! Principal moves into the engine's custody account through an allowance.
//! Interest accrues piecewise at the rate snapshotted when the stake opened,
//! and is paid out of whatever custody holds beyond the active principal.

use crate::interest::InterestAccrual;
use crate::{check_bps, journal, require_admin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokenomics_core::math::{TryAdd, TrySub};
use tokenomics_core::{AccountId, Amount, AssetId, Bps, Ledger, ProtocolError, Result, Timestamp};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub account: AccountId,
    pub principal: Amount,
    pub rate_bps: Bps,
    pub start_time: Timestamp,
    pub last_accrual: Timestamp,
    pub accrued: InterestAccrual,
    pub active: bool,
}

impl StakeRecord {
    fn accrue_to(&mut self, now: Timestamp) -> Result<()> {
        let elapsed = now.saturating_sub(self.last_accrual);
        self.accrued.accrue(self.principal, self.rate_bps, elapsed)?;
        self.last_accrual = self.last_accrual.max(now);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub account: AccountId,
    pub principal: Amount,
    pub interest: Amount,
    pub payout: Amount,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingEngine {
    token: AssetId,
    custody: AccountId,
    admin: AccountId,
    interest_rate_bps: Bps,
    min_staking_period_secs: u64,
    period_length_secs: u64,
    stakes: BTreeMap<AccountId, StakeRecord>,
    total_staked: Amount,
    claims: VecDeque<ClaimReceipt>,
}

impl StakingEngine {
    pub fn new(
        token: AssetId,
        custody: AccountId,
        admin: AccountId,
        interest_rate_bps: Bps,
        min_staking_period_secs: u64,
        period_length_secs: u64,
    ) -> Result<Self> {
        check_bps(interest_rate_bps)?;
        if period_length_secs == 0 {
            return Err(ProtocolError::InvalidConfig(
                "staking period length must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            token,
            custody,
            admin,
            interest_rate_bps,
            min_staking_period_secs,
            period_length_secs,
            stakes: BTreeMap::new(),
            total_staked: 0,
            claims: VecDeque::new(),
        })
    }

    /// Account holding staked principal and the reward reserve. Stakers
    /// approve this account before staking.
    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    pub fn token(&self) -> &AssetId {
        &self.token
    }

    pub fn interest_rate_bps(&self) -> Bps {
        self.interest_rate_bps
    }

    pub fn min_staking_period_secs(&self) -> u64 {
        self.min_staking_period_secs
    }

    pub fn period_length_secs(&self) -> u64 {
        self.period_length_secs
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    pub fn claims(&self) -> &VecDeque<ClaimReceipt> {
        &self.claims
    }

    /// Latest record for the account, active or not
    pub fn stake_of(&self, account: &AccountId) -> Option<&StakeRecord> {
        self.stakes.get(account)
    }

    pub fn active_stake(&self, account: &AccountId) -> Option<&StakeRecord> {
        self.stakes.get(account).filter(|s| s.active)
    }

    pub fn stakes(&self) -> impl Iterator<Item = &StakeRecord> {
        self.stakes.values()
    }

    pub fn staked_principal(&self, account: &AccountId) -> Amount {
        self.active_stake(account).map_or(0, |s| s.principal)
    }

    /// Custody cannot stake; its balance above `total_staked` is the reward reserve
    fn check_staker(&self, account: &AccountId) -> Result<()> {
        if account == &self.custody {
            return Err(ProtocolError::ReservedAccount(account.clone()));
        }
        Ok(())
    }

    fn active_record(&self, account: &AccountId) -> Result<&StakeRecord> {
        self.active_stake(account)
            .ok_or_else(|| ProtocolError::NotStaked(account.clone()))
    }

    pub fn stake<L: Ledger>(
        &mut self,
        ledger: &mut L,
        account: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount(
                "stake must be greater than 0".to_string(),
            ));
        }
        self.check_staker(account)?;
        if self.active_stake(account).is_some() {
            return Err(ProtocolError::AlreadyStaked(account.clone()));
        }
        let total_staked = self.total_staked.try_add(amount, "total staked")?;

        ledger.transfer_from(&self.token, account, &self.custody, &self.custody, amount)?;

        self.total_staked = total_staked;
        self.stakes.insert(
            account.clone(),
            StakeRecord {
                account: account.clone(),
                principal: amount,
                rate_bps: self.interest_rate_bps,
                start_time: now,
                last_accrual: now,
                accrued: InterestAccrual::new(),
                active: true,
            },
        );

        info!(%account, amount, rate_bps = self.interest_rate_bps, "stake opened");
        Ok(())
    }

    /// Add principal to an active stake. Interest on the old principal is
    /// accrued up to `now` first; the lock keeps its original start.
    pub fn increase_stake<L: Ledger>(
        &mut self,
        ledger: &mut L,
        account: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount(
                "stake increase must be greater than 0".to_string(),
            ));
        }
        self.check_staker(account)?;
        let mut record = self.active_record(account)?.clone();
        record.accrue_to(now)?;
        record.principal = record.principal.try_add(amount, "stake principal")?;
        let total_staked = self.total_staked.try_add(amount, "total staked")?;

        ledger.transfer_from(&self.token, account, &self.custody, &self.custody, amount)?;

        self.total_staked = total_staked;
        let principal = record.principal;
        self.stakes.insert(account.clone(), record);

        info!(%account, amount, principal, "stake increased");
        Ok(())
    }

    pub fn pending_interest(&self, account: &AccountId, now: Timestamp) -> Result<Amount> {
        let mut record = self.active_record(account)?.clone();
        record.accrue_to(now)?;
        record.accrued.whole_units(self.period_length_secs)
    }

    /// Seconds left before the stake can be claimed
    pub fn lock_remaining(&self, account: &AccountId, now: Timestamp) -> Result<u64> {
        let record = self.active_record(account)?;
        let elapsed = now.saturating_sub(record.start_time);
        Ok(self.min_staking_period_secs.saturating_sub(elapsed))
    }

    /// Custody balance not backing active principal
    pub fn reserve_available<L: Ledger>(&self, ledger: &L) -> Result<Amount> {
        ledger
            .balance_of(&self.token, &self.custody)
            .try_sub(self.total_staked, "staking reserve")
    }

    pub fn fund_reserve<L: Ledger>(
        &mut self,
        ledger: &mut L,
        from: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        ledger.transfer(&self.token, from, &self.custody, amount)?;
        info!(%from, amount, "staking reserve funded");
        Ok(())
    }

    pub fn claim<L: Ledger>(
        &mut self,
        ledger: &mut L,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<ClaimReceipt> {
        let remaining = self.lock_remaining(account, now)?;
        if remaining > 0 {
            return Err(ProtocolError::LockPeriodNotElapsed { remaining });
        }

        let mut record = self.active_record(account)?.clone();
        record.accrue_to(now)?;
        let interest = record.accrued.whole_units(self.period_length_secs)?;
        let payout = record.principal.try_add(interest, "stake payout")?;

        let available = self.reserve_available(ledger)?;
        if interest > available {
            return Err(ProtocolError::InsufficientReserve {
                required: interest,
                available,
            });
        }
        let total_staked = self.total_staked.try_sub(record.principal, "total staked")?;
        debug!(%account, interest, available, "claim reserve check passed");

        ledger.transfer(&self.token, &self.custody, account, payout)?;

        self.total_staked = total_staked;
        record.active = false;
        let receipt = ClaimReceipt {
            account: account.clone(),
            principal: record.principal,
            interest,
            payout,
            at: now,
        };
        self.stakes.insert(account.clone(), record);
        journal(&mut self.claims, receipt.clone());

        info!(%account, principal = receipt.principal, interest, "stake claimed");
        Ok(receipt)
    }

    /// Applies to stakes opened afterwards
    pub fn set_interest_rate(&mut self, caller: &AccountId, rate_bps: Bps) -> Result<()> {
        require_admin(&self.admin, caller)?;
        check_bps(rate_bps)?;
        self.interest_rate_bps = rate_bps;
        info!(rate_bps, "staking interest rate updated");
        Ok(())
    }

    pub fn set_min_staking_period(&mut self, caller: &AccountId, secs: u64) -> Result<()> {
        require_admin(&self.admin, caller)?;
        self.min_staking_period_secs = secs;
        info!(secs, "minimum staking period updated");
        Ok(())
    }
}
