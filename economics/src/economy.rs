//! The token economy as one serialized state machine
//!
//! `TokenEconomy` owns the ledger, the feeds and the three engines. Each
//! operation reads the clock once, rejects a clock that went backwards, and
//! either applies completely or returns an error with the state untouched.

use crate::config::ProtocolConfig;
use crate::lending::{LendingEngine, RepayReceipt};
use crate::pricing::{PurchaseReceipt, SaleEngine};
use crate::require_admin;
use crate::staking::{ClaimReceipt, StakingEngine};
use crate::supply::{ledger_stats, SupplyReport};
use serde::{Deserialize, Serialize};
use tokenomics_core::math::TryAdd;
use tokenomics_core::{
    AccountId, Amount, AssetId, Bps, Clock, Ledger, ProtocolError, Result, Timestamp, TokenLedger,
};
use tokenomics_oracle::{PriceFeeds, PricePair};
use tracing::{info, warn};

/// Everything a snapshot needs to resume the economy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyState {
    pub config: ProtocolConfig,
    pub ledger: TokenLedger,
    pub feeds: PriceFeeds,
    pub sale: SaleEngine,
    pub staking: StakingEngine,
    pub lending: LendingEngine,
    /// Latest clock reading accepted by an operation
    pub last_seen: Timestamp,
}

impl EconomyState {
    pub fn genesis(config: ProtocolConfig, now: Timestamp) -> Result<Self> {
        config.validate()?;

        let mut ledger = TokenLedger::new();
        ledger.create_asset(
            &config.token.symbol,
            &config.token.issuer,
            config.initial_supply()?,
        )?;
        ledger.create_asset(
            &config.lending.borrowed_asset,
            &config.lending.reserve_holder,
            config.reserve_supply()?,
        )?;

        let mut feeds = PriceFeeds::new(config.oracle.max_price_age_secs);
        for feed in &config.oracle.feeds {
            feeds.register(feed.pair.clone(), feed.decimals)?;
            feeds.publish(&feed.pair, config.feed_answer(feed)?, now)?;
        }

        let sale = SaleEngine::new(
            config.token.symbol.clone(),
            config.token.issuer.clone(),
            config.sale.spender.clone(),
            config.sale.native_pair.clone(),
            config.price_in_usd()?,
        );
        let staking = StakingEngine::new(
            config.token.symbol.clone(),
            config.staking.custody.clone(),
            config.admin.clone(),
            config.staking.interest_rate_bps,
            config.staking.min_staking_period_secs,
            config.staking.period_length_secs,
        )?;
        let lending = LendingEngine::new(
            config.lending.borrowed_asset.clone(),
            config.lending.collateral_pair.clone(),
            config.lending.borrowed_pair.clone(),
            config.lending.reserve_holder.clone(),
            config.lending.spender.clone(),
            config.admin.clone(),
            config.lending.interest_rate_bps,
            config.lending.max_lending_percent_bps,
            config.lending.period_length_secs,
        )?;

        info!(
            token = %config.token.symbol,
            issuer = %config.token.issuer,
            borrowed = %config.lending.borrowed_asset,
            now,
            "economy created"
        );
        Ok(Self {
            config,
            ledger,
            feeds,
            sale,
            staking,
            lending,
            last_seen: now,
        })
    }

    pub fn token(&self) -> &AssetId {
        &self.config.token.symbol
    }

    pub fn borrowed_asset(&self) -> &AssetId {
        &self.config.lending.borrowed_asset
    }

    /// Engine accounts move funds only through their engines
    fn check_not_reserved(&self, account: &AccountId) -> Result<()> {
        if account == self.staking.custody()
            || account == self.sale.spender()
            || account == self.lending.spender()
        {
            return Err(ProtocolError::ReservedAccount(account.clone()));
        }
        Ok(())
    }
}

pub struct TokenEconomy<C: Clock> {
    state: EconomyState,
    clock: C,
}

impl<C: Clock> TokenEconomy<C> {
    pub fn genesis(config: ProtocolConfig, clock: C) -> Result<Self> {
        let state = EconomyState::genesis(config, clock.now())?;
        Ok(Self { state, clock })
    }

    /// Resume from a snapshot
    pub fn from_state(state: EconomyState, clock: C) -> Self {
        Self { state, clock }
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    pub fn into_state(self) -> EconomyState {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.state.config
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.state.ledger
    }

    pub fn feeds(&self) -> &PriceFeeds {
        &self.state.feeds
    }

    pub fn sale(&self) -> &SaleEngine {
        &self.state.sale
    }

    pub fn staking(&self) -> &StakingEngine {
        &self.state.staking
    }

    pub fn lending(&self) -> &LendingEngine {
        &self.state.lending
    }

    /// One clock reading, checked against the last accepted one
    fn observe(&self) -> Result<Timestamp> {
        let now = self.clock.now();
        if now < self.state.last_seen {
            return Err(ProtocolError::ClockRegression {
                now,
                last: self.state.last_seen,
            });
        }
        Ok(now)
    }

    fn query<T>(&self, op: &'static str, f: impl FnOnce(&EconomyState, Timestamp) -> Result<T>) -> Result<T> {
        self.observe()
            .and_then(|now| f(&self.state, now))
            .inspect_err(|e| warn!(op, error = %e, "query rejected"))
    }

    fn apply<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut EconomyState, Timestamp) -> Result<T>,
    ) -> Result<T> {
        let now = self
            .observe()
            .inspect_err(|e| warn!(op, error = %e, "operation rejected"))?;
        let result = f(&mut self.state, now)
            .inspect_err(|e| warn!(op, error = %e, "operation rejected"))?;
        self.state.last_seen = now;
        Ok(result)
    }

    pub fn now(&self) -> Result<Timestamp> {
        self.observe()
    }

    pub fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Amount {
        self.state.ledger.balance_of(asset, account)
    }

    pub fn publish_price(&mut self, pair: &PricePair, answer: u128) -> Result<u64> {
        self.apply("publish_price", |s, now| s.feeds.publish(pair, answer, now))
    }

    pub fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.apply("transfer", |s, _| {
            s.check_not_reserved(from)?;
            s.ledger.transfer(asset, from, to, amount)
        })
    }

    pub fn approve(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.apply("approve", |s, _| {
            s.check_not_reserved(owner)?;
            s.ledger.approve(asset, owner, spender, amount)
        })
    }

    pub fn increase_allowance(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.apply("increase_allowance", |s, _| {
            s.check_not_reserved(owner)?;
            s.ledger.increase_allowance(asset, owner, spender, amount)
        })
    }

    pub fn unit_price(&self) -> Result<Amount> {
        self.query("unit_price", |s, now| s.sale.unit_price_in_native(&s.feeds, now))
    }

    pub fn quote_tokens(&self, native: Amount) -> Result<Amount> {
        self.query("quote_tokens", |s, now| s.sale.quote_tokens(&s.feeds, native, now))
    }

    pub fn price_of(&self, tokens: Amount) -> Result<Amount> {
        self.query("price_of", |s, now| s.sale.price_of(&s.feeds, tokens, now))
    }

    pub fn buy(&mut self, buyer: &AccountId, native_paid: Amount) -> Result<PurchaseReceipt> {
        self.apply("buy", |s, now| {
            s.sale.purchase(&mut s.ledger, &s.feeds, buyer, native_paid, now)
        })
    }

    pub fn buy_exact(
        &mut self,
        buyer: &AccountId,
        tokens: Amount,
        native_paid: Amount,
    ) -> Result<PurchaseReceipt> {
        self.apply("buy_exact", |s, now| {
            s.sale
                .purchase_exact(&mut s.ledger, &s.feeds, buyer, tokens, native_paid, now)
        })
    }

    pub fn stake(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        self.apply("stake", |s, now| {
            s.check_not_reserved(account)?;
            s.staking.stake(&mut s.ledger, account, amount, now)
        })
    }

    pub fn increase_stake(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        self.apply("increase_stake", |s, now| {
            s.check_not_reserved(account)?;
            s.staking.increase_stake(&mut s.ledger, account, amount, now)
        })
    }

    pub fn fund_staking_reserve(&mut self, from: &AccountId, amount: Amount) -> Result<()> {
        self.apply("fund_staking_reserve", |s, _| {
            s.check_not_reserved(from)?;
            s.staking.fund_reserve(&mut s.ledger, from, amount)
        })
    }

    pub fn pending_interest(&self, account: &AccountId) -> Result<Amount> {
        self.query("pending_interest", |s, now| s.staking.pending_interest(account, now))
    }

    /// Stakes backing an open loan stay locked until the loan closes
    pub fn claim(&mut self, account: &AccountId) -> Result<ClaimReceipt> {
        self.apply("claim", |s, now| {
            if s.lending.has_open_loan(account) {
                return Err(ProtocolError::CollateralLocked(account.clone()));
            }
            s.staking.claim(&mut s.ledger, account, now)
        })
    }

    pub fn staked_value(&self, account: &AccountId) -> Result<Amount> {
        self.query("staked_value", |s, now| {
            s.lending
                .staked_value_in_borrowed(&s.feeds, &s.staking, account, now)
        })
    }

    pub fn borrow_limit(&self, account: &AccountId, percent_bps: Bps) -> Result<Amount> {
        self.query("borrow_limit", |s, now| {
            s.lending
                .get_borrow_limit(&s.feeds, &s.staking, account, percent_bps, now)
        })
    }

    pub fn borrow(&mut self, account: &AccountId, percent_bps: Bps) -> Result<Amount> {
        self.apply("borrow", |s, now| {
            s.lending.open_loan(
                &mut s.ledger,
                &s.feeds,
                &s.staking,
                account,
                percent_bps,
                now,
            )
        })
    }

    pub fn total_debt(&self, account: &AccountId) -> Result<Amount> {
        self.query("total_debt", |s, now| s.lending.total_debt(account, now))
    }

    pub fn accrue_debt(&mut self, account: &AccountId) -> Result<Amount> {
        self.apply("accrue_debt", |s, now| {
            s.lending.accrue_and_get_total_debt(account, now)
        })
    }

    pub fn repay(&mut self, account: &AccountId, amount: Amount) -> Result<RepayReceipt> {
        self.apply("repay", |s, now| s.lending.repay(&mut s.ledger, account, amount, now))
    }

    pub fn repay_in_full(&mut self, account: &AccountId) -> Result<RepayReceipt> {
        self.apply("repay_in_full", |s, now| {
            s.lending.repay_in_full(&mut s.ledger, account, now)
        })
    }

    pub fn set_staking_interest_rate(&mut self, caller: &AccountId, rate_bps: Bps) -> Result<()> {
        self.apply("set_staking_interest_rate", |s, _| {
            s.staking.set_interest_rate(caller, rate_bps)
        })
    }

    pub fn set_min_staking_period(&mut self, caller: &AccountId, secs: u64) -> Result<()> {
        self.apply("set_min_staking_period", |s, _| {
            s.staking.set_min_staking_period(caller, secs)
        })
    }

    pub fn set_lending_interest_rate(&mut self, caller: &AccountId, rate_bps: Bps) -> Result<()> {
        self.apply("set_lending_interest_rate", |s, _| {
            s.lending.set_interest_rate(caller, rate_bps)
        })
    }

    pub fn set_max_lending_percent(&mut self, caller: &AccountId, percent_bps: Bps) -> Result<()> {
        self.apply("set_max_lending_percent", |s, _| {
            s.lending.set_max_lending_percent(caller, percent_bps)
        })
    }

    pub fn set_max_price_age(&mut self, caller: &AccountId, secs: u64) -> Result<()> {
        self.apply("set_max_price_age", |s, _| {
            require_admin(&s.config.admin, caller)?;
            s.feeds.set_max_price_age(secs);
            info!(secs, "max price age updated");
            Ok(())
        })
    }

    /// Conservation check over every asset, plus engine totals
    pub fn audit(&self) -> Result<SupplyReport> {
        self.query("audit", |s, now| {
            let mut borrowed_outstanding: Amount = 0;
            for loan in s.lending.open_loans() {
                let debt = s.lending.total_debt(&loan.borrower, now)?;
                borrowed_outstanding = borrowed_outstanding.try_add(debt, "outstanding debt")?;
            }
            Ok(SupplyReport {
                assets: ledger_stats(&s.ledger)?,
                total_staked: s.staking.total_staked(),
                staking_reserve: s.staking.reserve_available(&s.ledger)?,
                open_loans: s.lending.open_loans().count(),
                borrowed_outstanding,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenomics_core::{ManualClock, TOKEN_UNIT};

    fn economy(clock: &ManualClock) -> TokenEconomy<ManualClock> {
        let mut config = ProtocolConfig::local();
        config.staking.min_staking_period_secs = 10;
        config.staking.period_length_secs = 10;
        TokenEconomy::genesis(config, clock.clone()).unwrap()
    }

    #[test]
    fn test_genesis_balances() {
        let clock = ManualClock::new(1_000);
        let eco = economy(&clock);
        let token = eco.state().token().clone();
        let founder = AccountId::new("founder");

        assert_eq!(eco.balance_of(&token, &founder), 1_000_000 * TOKEN_UNIT);
        assert_eq!(
            eco.balance_of(eco.state().borrowed_asset(), &AccountId::new("link-reserve")),
            1_000_000 * TOKEN_UNIT
        );
        assert_eq!(eco.ledger().issuer(&token), Some(&founder));
        assert_eq!(
            eco.ledger().issuer(eco.state().borrowed_asset()),
            Some(&AccountId::new("link-reserve"))
        );
        assert_eq!(eco.unit_price().unwrap(), 6_188_118_811_881);
        assert!(eco.audit().unwrap().is_conserved());
    }

    #[test]
    fn test_clock_regression_is_rejected() {
        let clock = ManualClock::new(1_000);
        let mut eco = economy(&clock);
        let founder = AccountId::new("founder");
        let token = eco.state().token().clone();

        eco.approve(&token, &founder, &AccountId::new("sale"), 10).unwrap();

        // A snapshot resumed with an earlier clock
        let state = eco.into_state();
        let mut eco = TokenEconomy::from_state(state, ManualClock::new(999));
        assert_eq!(
            eco.approve(&token, &founder, &AccountId::new("sale"), 20),
            Err(ProtocolError::ClockRegression {
                now: 999,
                last: 1_000,
            })
        );
        assert_eq!(
            eco.ledger()
                .allowance(&token, &founder, &AccountId::new("sale")),
            10
        );
    }

    #[test]
    fn test_claim_blocked_by_open_loan() {
        let clock = ManualClock::new(0);
        let mut eco = economy(&clock);
        let token = eco.state().token().clone();
        let link = eco.state().borrowed_asset().clone();
        let founder = AccountId::new("founder");
        let reserve = AccountId::new("link-reserve");

        eco.approve(&token, &founder, &AccountId::new("staking"), 1_000)
            .unwrap();
        eco.stake(&founder, 1_000).unwrap();
        eco.fund_staking_reserve(&founder, 10_000).unwrap();
        eco.approve(&link, &reserve, &AccountId::new("lending"), 1_000_000)
            .unwrap();
        let borrowed = eco.borrow(&founder, 7_000).unwrap();
        assert_eq!(borrowed, 141_400);

        clock.advance(10);
        assert_eq!(
            eco.claim(&founder),
            Err(ProtocolError::CollateralLocked(founder.clone()))
        );

        eco.repay_in_full(&founder).unwrap();
        eco.claim(&founder).unwrap();
        assert!(eco.audit().unwrap().is_conserved());
    }

    #[test]
    fn test_custody_cannot_be_drained() {
        let clock = ManualClock::new(0);
        let mut eco = economy(&clock);
        let token = eco.state().token().clone();
        let founder = AccountId::new("founder");
        let staking = AccountId::new("staking");
        let mallory = AccountId::new("mallory");

        eco.approve(&token, &founder, &staking, 1_000).unwrap();
        eco.stake(&founder, 1_000).unwrap();
        eco.fund_staking_reserve(&founder, 10_000).unwrap();

        assert_eq!(
            eco.transfer(&token, &staking, &mallory, 1_000),
            Err(ProtocolError::ReservedAccount(staking.clone()))
        );
        assert_eq!(
            eco.approve(&token, &staking, &mallory, 1_000),
            Err(ProtocolError::ReservedAccount(staking.clone()))
        );
        assert_eq!(
            eco.increase_allowance(&token, &staking, &mallory, 1_000),
            Err(ProtocolError::ReservedAccount(staking.clone()))
        );
        assert_eq!(eco.balance_of(&token, &mallory), 0);

        clock.advance(11);
        let receipt = eco.claim(&founder).unwrap();
        assert_eq!(receipt.principal, 1_000);
        let report = eco.audit().unwrap();
        assert!(report.is_conserved());
        assert_eq!(report.total_staked, 0);
    }

    #[test]
    fn test_engine_accounts_cannot_stake_or_fund() {
        let clock = ManualClock::new(0);
        let mut eco = economy(&clock);
        let founder = AccountId::new("founder");
        eco.fund_staking_reserve(&founder, 500).unwrap();

        for name in ["staking", "sale", "lending"] {
            let account = AccountId::new(name);
            assert_eq!(
                eco.stake(&account, 500),
                Err(ProtocolError::ReservedAccount(account.clone()))
            );
            assert_eq!(
                eco.fund_staking_reserve(&account, 1),
                Err(ProtocolError::ReservedAccount(account.clone()))
            );
        }
        assert_eq!(eco.staking().total_staked(), 0);
        assert_eq!(eco.staking().reserve_available(eco.ledger()).unwrap(), 500);
    }

    #[test]
    fn test_admin_surface() {
        let clock = ManualClock::new(0);
        let mut eco = economy(&clock);
        let founder = AccountId::new("founder");
        let mallory = AccountId::new("mallory");

        assert_eq!(
            eco.set_max_price_age(&mallory, 1),
            Err(ProtocolError::Unauthorized(mallory.clone()))
        );
        eco.set_max_price_age(&founder, 1).unwrap();
        clock.advance(2);
        assert!(matches!(
            eco.unit_price(),
            Err(ProtocolError::StalePrice { .. })
        ));

        eco.publish_price(&PricePair::usd("ETH"), 161_600_000_000)
            .unwrap();
        assert!(eco.unit_price().is_ok());
        eco.set_staking_interest_rate(&founder, 1_500).unwrap();
        assert_eq!(eco.staking().interest_rate_bps(), 1_500);
    }
}
