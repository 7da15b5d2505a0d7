//! Subcommand handlers over a loaded economy

use crate::{display, AdminCommand, Commands, Economy};
use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokenomics_core::math::parse_units;
use tokenomics_core::{AccountId, Amount, AssetId, Ledger, ProtocolError, TOKEN_UNIT};
use tokenomics_oracle::PricePair;

// JSON bodies are typed structs; `serde_json::Value` cannot hold amounts above u64.

#[derive(Serialize)]
struct Published<'a> {
    pair: &'a PricePair,
    answer: u128,
    round_id: u64,
}

#[derive(Serialize)]
struct Allowance<'a> {
    asset: &'a AssetId,
    owner: &'a AccountId,
    spender: &'a AccountId,
    allowance: Amount,
}

#[derive(Serialize)]
struct Transferred<'a> {
    asset: &'a AssetId,
    from: &'a AccountId,
    to: &'a AccountId,
    amount: Amount,
}

#[derive(Serialize)]
struct Quote {
    unit_price: Amount,
    native: Amount,
    tokens: Amount,
}

#[derive(Serialize)]
struct Debt<'a> {
    borrower: &'a AccountId,
    debt: Amount,
}

fn asset_or_token(eco: &Economy, asset: Option<String>) -> AssetId {
    asset.map_or_else(|| eco.state().token().clone(), AssetId::new)
}

/// Run one command. Returns whether the state changed and needs saving.
pub fn dispatch(eco: &mut Economy, command: Commands, as_json: bool) -> Result<bool> {
    match command {
        Commands::Init { .. } | Commands::Demo => {
            bail!("command is handled before the state is loaded")
        }

        Commands::Feed { pair, price } => {
            let pair: PricePair = pair.parse()?;
            let decimals = eco
                .feeds()
                .feed(&pair)
                .map(|f| f.decimals())
                .ok_or_else(|| ProtocolError::UnknownPricePair(pair.to_string()))?;
            let answer = parse_units(&price, u32::from(decimals))
                .with_context(|| format!("price for {}", pair))?;
            let round_id = eco.publish_price(&pair, answer)?;
            if as_json {
                display::json(&Published {
                    pair: &pair,
                    answer,
                    round_id,
                })?;
            } else {
                display::ok(&format!("{} = {} (round {})", pair, price, round_id));
            }
            Ok(true)
        }

        Commands::Approve {
            owner,
            spender,
            asset,
            increase,
            amount,
        } => {
            let asset = asset_or_token(eco, asset);
            let owner = AccountId::new(owner);
            let spender = AccountId::new(spender);
            if increase {
                eco.increase_allowance(&asset, &owner, &spender, amount)?;
            } else {
                eco.approve(&asset, &owner, &spender, amount)?;
            }
            let allowance = eco.ledger().allowance(&asset, &owner, &spender);
            if as_json {
                display::json(&Allowance {
                    asset: &asset,
                    owner: &owner,
                    spender: &spender,
                    allowance,
                })?;
            } else {
                display::ok(&format!(
                    "{} may spend {} {} of {}",
                    spender, allowance, asset, owner
                ));
            }
            Ok(true)
        }

        Commands::Transfer {
            from,
            to,
            asset,
            amount,
        } => {
            let asset = asset_or_token(eco, asset);
            let from = AccountId::new(from);
            let to = AccountId::new(to);
            eco.transfer(&asset, &from, &to, amount)?;
            if as_json {
                display::json(&Transferred {
                    asset: &asset,
                    from: &from,
                    to: &to,
                    amount,
                })?;
            } else {
                display::ok(&format!("{} {} moved from {} to {}", amount, asset, from, to));
            }
            Ok(true)
        }

        Commands::Quote { pay, tokens } => {
            let unit_price = eco.unit_price()?;
            let (native, tokens) = match (pay, tokens) {
                (Some(native), _) => (native, eco.quote_tokens(native)?),
                (None, Some(tokens)) => (eco.price_of(tokens)?, tokens),
                (None, None) => (unit_price, TOKEN_UNIT),
            };
            if as_json {
                display::json(&Quote {
                    unit_price,
                    native,
                    tokens,
                })?;
            } else {
                display::section("Quote");
                display::row("Unit price", unit_price);
                display::row("Native", native);
                display::row("Tokens", display::units(tokens).bright_yellow());
                display::end();
            }
            Ok(false)
        }

        Commands::Buy { buyer, pay, tokens } => {
            let buyer = AccountId::new(buyer);
            let receipt = match tokens {
                Some(tokens) => eco.buy_exact(&buyer, tokens, pay)?,
                None => eco.buy(&buyer, pay)?,
            };
            if as_json {
                display::json(&receipt)?;
            } else {
                display::purchase(&receipt);
            }
            Ok(true)
        }

        Commands::Stake { account, amount } => {
            let account = AccountId::new(account);
            eco.stake(&account, amount)?;
            staked(eco, &account, as_json)?;
            Ok(true)
        }

        Commands::IncreaseStake { account, amount } => {
            let account = AccountId::new(account);
            eco.increase_stake(&account, amount)?;
            staked(eco, &account, as_json)?;
            Ok(true)
        }

        Commands::FundStaking { from, amount } => {
            eco.fund_staking_reserve(&AccountId::new(from), amount)?;
            let reserve = eco.staking().reserve_available(eco.ledger())?;
            if as_json {
                display::json(&reserve)?;
            } else {
                display::ok(&format!("Staking reserve now {}", display::units(reserve)));
            }
            Ok(true)
        }

        Commands::Claim { account } => {
            let receipt = eco.claim(&AccountId::new(account))?;
            if as_json {
                display::json(&receipt)?;
            } else {
                display::claim(&receipt);
            }
            Ok(true)
        }

        Commands::Borrow { account, percent } => {
            let account = AccountId::new(account);
            let borrowed = eco.borrow(&account, percent)?;
            if as_json {
                display::json(&eco.lending().loan_of(&account))?;
            } else {
                display::ok(&format!(
                    "{} borrowed {} {}",
                    account,
                    display::units(borrowed),
                    eco.state().borrowed_asset()
                ));
            }
            Ok(true)
        }

        Commands::Debt { account } => {
            let account = AccountId::new(account);
            let debt = eco.total_debt(&account)?;
            if as_json {
                display::json(&Debt {
                    borrower: &account,
                    debt,
                })?;
            } else {
                display::row("Debt", display::units(debt).bright_yellow());
            }
            Ok(false)
        }

        Commands::Repay {
            account,
            full,
            amount,
        } => {
            let account = AccountId::new(account);
            let receipt = match (full, amount) {
                (true, _) => eco.repay_in_full(&account)?,
                (false, Some(amount)) => eco.repay(&account, amount)?,
                (false, None) => bail!("give an amount or --full"),
            };
            if as_json {
                display::json(&receipt)?;
            } else {
                display::repayment(&receipt);
            }
            Ok(true)
        }

        Commands::Admin { caller, action } => {
            let caller = AccountId::new(caller);
            admin(eco, &caller, action)?;
            display::ok("Parameter updated");
            Ok(true)
        }

        Commands::Report => {
            if as_json {
                display::json(eco.state())?;
            } else {
                display::report(eco)?;
            }
            Ok(false)
        }

        Commands::Audit => {
            let report = eco.audit()?;
            if as_json {
                display::json(&report)?;
            } else {
                display::audit(&report);
            }
            if !report.is_conserved() {
                bail!("supply is not conserved");
            }
            Ok(false)
        }
    }
}

fn staked(eco: &Economy, account: &AccountId, as_json: bool) -> Result<()> {
    let record = eco
        .staking()
        .active_stake(account)
        .ok_or_else(|| ProtocolError::NotStaked(account.clone()))?;
    if as_json {
        return display::json(record);
    }
    display::ok(&format!(
        "{} has {} staked",
        account,
        display::units(record.principal)
    ));
    Ok(())
}

fn admin(eco: &mut Economy, caller: &AccountId, action: AdminCommand) -> Result<()> {
    match action {
        AdminCommand::StakingRate { bps } => eco.set_staking_interest_rate(caller, bps)?,
        AdminCommand::MinStakingPeriod { secs } => eco.set_min_staking_period(caller, secs)?,
        AdminCommand::LendingRate { bps } => eco.set_lending_interest_rate(caller, bps)?,
        AdminCommand::MaxLendingPercent { bps } => eco.set_max_lending_percent(caller, bps)?,
        AdminCommand::MaxPriceAge { secs } => eco.set_max_price_age(caller, secs)?,
    }
    Ok(())
}
