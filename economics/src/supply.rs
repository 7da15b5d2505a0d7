//! Supply tracking and the conservation audit

use serde::{Deserialize, Serialize};
use tokenomics_core::math::TryAdd;
use tokenomics_core::{AccountId, Amount, AssetId, Ledger, Result, TokenLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyStats {
    pub asset: AssetId,
    pub total_supply: Amount,
    /// Sum of every balance held for the asset
    pub sum_of_balances: Amount,
    pub holders: usize,
    pub balances: Vec<(AccountId, Amount)>,
}

impl SupplyStats {
    pub fn is_conserved(&self) -> bool {
        self.sum_of_balances == self.total_supply
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyReport {
    pub assets: Vec<SupplyStats>,
    pub total_staked: Amount,
    pub staking_reserve: Amount,
    pub open_loans: usize,
    pub borrowed_outstanding: Amount,
}

impl SupplyReport {
    pub fn is_conserved(&self) -> bool {
        self.assets.iter().all(SupplyStats::is_conserved)
    }

    pub fn asset(&self, asset: &AssetId) -> Option<&SupplyStats> {
        self.assets.iter().find(|s| &s.asset == asset)
    }
}

/// Per-asset supply figures straight from the ledger
pub fn asset_stats(ledger: &TokenLedger, asset: &AssetId) -> Result<SupplyStats> {
    let balances = ledger.holders(asset);
    let mut sum_of_balances: Amount = 0;
    for (_, balance) in &balances {
        sum_of_balances = sum_of_balances.try_add(*balance, "supply audit")?;
    }
    Ok(SupplyStats {
        asset: asset.clone(),
        total_supply: ledger.total_supply(asset),
        sum_of_balances,
        holders: balances.len(),
        balances,
    })
}

pub fn ledger_stats(ledger: &TokenLedger) -> Result<Vec<SupplyStats>> {
    ledger
        .assets()
        .map(|asset| asset_stats(ledger, asset))
        .collect()
}
