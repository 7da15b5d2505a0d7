//! In-memory walk-through of the whole protocol on a manual clock
//!
//! Uses the local configuration with 10-second staking and lending periods
//! so the interest is visible after a few simulated seconds.

use crate::{display, Economy};
use anyhow::{ensure, Result};
use economics::{ProtocolConfig, TokenEconomy};
use owo_colors::OwoColorize;
use tokenomics_core::{AccountId, AssetId, Clock, ManualClock, Timestamp};
use tokenomics_oracle::PricePair;
use tracing::info;

const START: Timestamp = 1_700_000_000;

pub fn demo_config() -> ProtocolConfig {
    let mut config = ProtocolConfig::local();
    config.staking.min_staking_period_secs = 10;
    config.staking.period_length_secs = 10;
    config.lending.period_length_secs = 10;
    config
}

fn stage(title: &str) {
    println!("{}", format!("═══ {} ═══", title).cyan().bold());
    println!();
}

/// Print balances of both assets and fail if either sum drifts from supply
fn checkpoint(eco: &Economy, token: &AssetId, borrowed: &AssetId) -> Result<()> {
    display::balances(eco, token);
    display::balances(eco, borrowed);
    let report = eco.audit()?;
    ensure!(report.is_conserved(), "supply drifted: {:?}", report.assets);
    Ok(())
}

pub fn run() -> Result<()> {
    let economy = walk_through(&ManualClock::new(START))?;
    let report = economy.audit()?;
    display::audit(&report);
    display::ok("Demo finished with every supply conserved");
    Ok(())
}

pub fn walk_through(clock: &ManualClock) -> Result<Economy> {
    let founder = AccountId::new("founder");
    let sale = AccountId::new("sale");
    let staking = AccountId::new("staking");
    let lending = AccountId::new("lending");
    let reserve = AccountId::new("link-reserve");
    let user_1 = AccountId::new("user_1");
    let user_2 = AccountId::new("user_2");

    stage("Mint");
    let boxed: Box<dyn Clock> = Box::new(clock.clone());
    let mut eco: Economy = TokenEconomy::genesis(demo_config(), boxed)?;
    let token = eco.state().token().clone();
    let link = eco.state().borrowed_asset().clone();
    display::genesis(&eco);
    checkpoint(&eco, &token, &link)?;

    stage("Buy");
    for (buyer, paid) in [(&user_1, 1), (&user_2, 2)] {
        let tokens = eco.quote_tokens(paid)?;
        eco.increase_allowance(&token, &founder, &sale, tokens)?;
        let receipt = eco.buy(buyer, paid)?;
        display::purchase(&receipt);
    }
    println!();
    checkpoint(&eco, &token, &link)?;

    stage("Stake");
    eco.fund_staking_reserve(&founder, 10_000_000)?;
    eco.approve(&token, &user_1, &staking, 1_000)?;
    eco.stake(&user_1, 1_000)?;
    display::ok("user_1 staked 1000");
    clock.advance(11);
    info!(
        pending = eco.pending_interest(&user_1)?,
        "lock period elapsed"
    );
    println!();
    checkpoint(&eco, &token, &link)?;

    stage("Claim");
    let receipt = eco.claim(&user_1)?;
    display::claim(&receipt);
    println!();
    checkpoint(&eco, &token, &link)?;

    stage("Borrow");
    eco.approve(&token, &user_1, &staking, 1_000)?;
    eco.stake(&user_1, 1_000)?;
    eco.approve(&link, &reserve, &lending, 1_000_000)?;
    eco.publish_price(&PricePair::usd("ETH"), 130_000_000_000)?;
    display::row("Staked value", eco.staked_value(&user_1)?);
    let borrowed = eco.borrow(&user_1, 5_000)?;
    display::ok(&format!("user_1 borrowed {} {}", borrowed, link));
    println!();
    checkpoint(&eco, &token, &link)?;

    stage("Repay");
    clock.advance(10);
    // interest is paid in the borrowed asset
    eco.transfer(&link, &reserve, &user_1, 10_000)?;
    let first = eco.repay(&user_1, borrowed / 2)?;
    display::repayment(&first);
    let last = eco.repay_in_full(&user_1)?;
    display::repayment(&last);
    ensure!(last.closed, "loan still open after full repayment");
    display::claim(&eco.claim(&user_1)?);
    println!();
    checkpoint(&eco, &token, &link)?;

    Ok(eco)
}
