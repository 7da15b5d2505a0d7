//! Terminal rendering for economy state and receipts

use crate::Economy;
use anyhow::Result;
use chrono::DateTime;
use economics::{ClaimReceipt, PurchaseReceipt, RepayReceipt, SupplyReport};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokenomics_core::math::format_units;
use tokenomics_core::{Amount, AssetId, Ledger, Timestamp, TOKEN_DECIMALS};
use tokenomics_oracle::PriceOracle;

const RULE: &str = "──────────────────────────────────────────────────────────────";

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Raw micro-units followed by the whole-token value
pub fn units(value: Amount) -> String {
    format!("{} ({})", value, format_units(value, TOKEN_DECIMALS))
}

pub fn timestamp(secs: Timestamp) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map_or_else(
            || secs.to_string(),
            |t| format!("{} ({})", t.format("%Y-%m-%d %H:%M:%S UTC"), secs),
        )
}

pub fn section(title: &str) {
    let head = format!("┌─ {} ", title);
    let pad = RULE.chars().count().saturating_sub(head.chars().count());
    println!("{}{}", head.blue(), "─".repeat(pad).blue());
}

pub fn end() {
    println!("{}", format!("└{}", RULE).blue());
    println!();
}

pub fn row(label: &str, value: impl std::fmt::Display) {
    println!("│ {:<24} {}", format!("{}:", label).bright_black(), value);
}

pub fn ok(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn genesis(eco: &Economy) {
    let config = eco.config();
    ok("Economy created");
    section("Genesis");
    row("Token", config.token.symbol.bright_green());
    if let Some(issuer) = eco.ledger().issuer(eco.state().token()) {
        row("Issuer", issuer);
    }
    row(
        "Initial supply",
        units(eco.ledger().total_supply(eco.state().token())),
    );
    row("Borrowed asset", config.lending.borrowed_asset.bright_green());
    if let Some(holder) = eco.ledger().issuer(eco.state().borrowed_asset()) {
        row("Reserve holder", holder);
    }
    row(
        "Reserve supply",
        units(eco.ledger().total_supply(eco.state().borrowed_asset())),
    );
    row("Created at", timestamp(eco.state().last_seen));
    end();
}

pub fn balances(eco: &Economy, asset: &AssetId) {
    section(&format!("{} balances", asset));
    let mut sum: Amount = 0;
    for (account, balance) in eco.ledger().holders(asset) {
        row(account.as_str(), units(balance));
        sum = sum.saturating_add(balance);
    }
    let supply = eco.ledger().total_supply(asset);
    let sum_text = units(sum);
    if sum == supply {
        row("Sum", sum_text.green().bold());
    } else {
        row("Sum", sum_text.red().bold());
        row("Total supply", units(supply));
    }
    end();
}

pub fn purchase(receipt: &PurchaseReceipt) {
    ok(&format!("{} bought tokens", receipt.buyer));
    row("Tokens", units(receipt.tokens).bright_yellow());
    row("Charged", receipt.charged);
    row("Refund", receipt.refund);
    row("Unit price", receipt.unit_price);
}

pub fn claim(receipt: &ClaimReceipt) {
    ok(&format!("{} claimed stake", receipt.account));
    row("Principal", units(receipt.principal));
    row("Interest", units(receipt.interest).bright_yellow());
    row("Payout", units(receipt.payout));
}

pub fn repayment(receipt: &RepayReceipt) {
    if receipt.closed {
        ok(&format!("{} repaid and closed the loan", receipt.borrower));
    } else {
        ok(&format!("{} repaid part of the loan", receipt.borrower));
    }
    row("Amount", units(receipt.amount));
    row("Interest paid", receipt.interest_paid);
    row("Principal paid", receipt.principal_paid);
    row("Remaining", units(receipt.remaining).bright_yellow());
}

pub fn report(eco: &Economy) -> Result<()> {
    let now = eco.now()?;

    section("Prices");
    for pair in eco.feeds().pairs() {
        match eco.feeds().latest_price(pair, now) {
            Ok(reading) => row(
                &pair.to_string(),
                format!(
                    "{} (round {}, {}s old)",
                    format_units(reading.price, u32::from(reading.decimals)),
                    reading.round_id,
                    reading.age(now)
                ),
            ),
            Err(e) => row(&pair.to_string(), e.to_string().red()),
        }
    }
    end();

    for asset in eco.ledger().assets() {
        balances(eco, asset);
    }

    let staking = eco.staking();
    section("Staking");
    row("Rate (bps)", staking.interest_rate_bps());
    row("Min period (s)", staking.min_staking_period_secs());
    row("Total staked", units(staking.total_staked()));
    row("Reserve", units(staking.reserve_available(eco.ledger())?));
    for stake in staking.stakes().filter(|s| s.active) {
        let pending = staking.pending_interest(&stake.account, now)?;
        let remaining = staking.lock_remaining(&stake.account, now)?;
        row(
            stake.account.as_str(),
            format!(
                "{} staked, {} pending, unlocks in {}s",
                stake.principal, pending, remaining
            ),
        );
    }
    end();

    let lending = eco.lending();
    section("Lending");
    row("Rate (bps)", lending.interest_rate_bps());
    row("Max percent (bps)", lending.max_lending_percent_bps());
    for loan in lending.open_loans() {
        let debt = lending.total_debt(&loan.borrower, now)?;
        row(
            loan.borrower.as_str(),
            format!("{} borrowed, {} owed", loan.principal, debt),
        );
    }
    row("Closed loans", lending.closed_loans().len());
    end();
    Ok(())
}

pub fn audit(report: &SupplyReport) {
    section("Supply audit");
    for stats in &report.assets {
        let status = if stats.is_conserved() {
            "conserved".green().to_string()
        } else {
            "MISMATCH".red().bold().to_string()
        };
        row(
            stats.asset.as_str(),
            format!(
                "supply {}, balances {}, {} holders, {}",
                stats.total_supply, stats.sum_of_balances, stats.holders, status
            ),
        );
    }
    row("Total staked", units(report.total_staked));
    row("Staking reserve", units(report.staking_reserve));
    row("Open loans", report.open_loans);
    row("Borrowed outstanding", units(report.borrowed_outstanding));
    end();
}
