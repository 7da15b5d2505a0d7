//! Balance and allowance bookkeeping
//!
//! `Ledger` is the capability every engine consumes; `TokenLedger` is the
//! in-process implementation holding one book per asset.

use crate::constants::{JOURNAL_CAPACITY, UNLIMITED_ALLOWANCE};
use crate::error::{ProtocolError, Result};
use crate::math::{TryAdd, TrySub};
use crate::types::{AccountId, Amount, AssetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Fungible balance/allowance capability.
///
/// Every mutating call is all-or-nothing: on `Err` no balance or allowance
/// has changed.
pub trait Ledger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Amount;

    fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount;

    fn total_supply(&self, asset: &AssetId) -> Amount;

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    /// Overwrite the allowance of `spender` over `owner`'s balance
    fn approve(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    fn increase_allowance(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        added: Amount,
    ) -> Result<()>;

    fn decrease_allowance(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        subtracted: Amount,
    ) -> Result<()>;

    /// Move `amount` from `owner` to `to` on behalf of `spender`.
    ///
    /// An allowance of `UNLIMITED_ALLOWANCE` is never decremented.
    fn transfer_from(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()>;
}

/// Audit trail entry, appended after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    Mint {
        asset: AssetId,
        to: AccountId,
        amount: Amount,
    },
    Transfer {
        asset: AssetId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        spender: Option<AccountId>,
    },
    Approval {
        asset: AssetId,
        owner: AccountId,
        spender: AccountId,
        allowance: Amount,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetBook {
    issuer: AccountId,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    /// owner -> spender -> remaining allowance
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
}

impl AssetBook {
    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn set_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    books: BTreeMap<AssetId, AssetBook>,
    /// Most recent `JOURNAL_CAPACITY` events
    events: VecDeque<LedgerEvent>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis mint: `issuer` receives the entire initial supply
    pub fn create_asset(
        &mut self,
        asset: &AssetId,
        issuer: &AccountId,
        initial_supply: Amount,
    ) -> Result<()> {
        if self.books.contains_key(asset) {
            return Err(ProtocolError::AssetAlreadyExists(asset.clone()));
        }

        let mut book = AssetBook {
            issuer: issuer.clone(),
            total_supply: initial_supply,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        };
        book.balances.insert(issuer.clone(), initial_supply);
        self.books.insert(asset.clone(), book);
        self.record(LedgerEvent::Mint {
            asset: asset.clone(),
            to: issuer.clone(),
            amount: initial_supply,
        });

        debug!(%asset, %issuer, initial_supply, "asset created");
        Ok(())
    }

    pub fn has_asset(&self, asset: &AssetId) -> bool {
        self.books.contains_key(asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.books.keys()
    }

    pub fn issuer(&self, asset: &AssetId) -> Option<&AccountId> {
        self.books.get(asset).map(|book| &book.issuer)
    }

    /// Accounts with a non-zero balance of `asset`
    pub fn holders(&self, asset: &AssetId) -> Vec<(AccountId, Amount)> {
        self.books
            .get(asset)
            .map(|book| {
                book.balances
                    .iter()
                    .filter(|(_, balance)| **balance > 0)
                    .map(|(account, balance)| (account.clone(), *balance))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn events(&self) -> &VecDeque<LedgerEvent> {
        &self.events
    }

    fn record(&mut self, event: LedgerEvent) {
        self.events.push_back(event);
        while self.events.len() > JOURNAL_CAPACITY {
            self.events.pop_front();
        }
    }

    fn book(&self, asset: &AssetId) -> Result<&AssetBook> {
        self.books
            .get(asset)
            .ok_or_else(|| ProtocolError::UnknownAsset(asset.clone()))
    }

    fn book_mut(&mut self, asset: &AssetId) -> Result<&mut AssetBook> {
        self.books
            .get_mut(asset)
            .ok_or_else(|| ProtocolError::UnknownAsset(asset.clone()))
    }

    fn move_balance(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount(
                "transfer amount must be greater than 0".to_string(),
            ));
        }

        let book = self.book_mut(asset)?;
        let available = book.balance(from);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                asset: asset.clone(),
                account: from.clone(),
                requested: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }

        // Compute both sides before touching either
        let debited = available.try_sub(amount, "ledger debit")?;
        let credited = book.balance(to).try_add(amount, "ledger credit")?;
        book.balances.insert(from.clone(), debited);
        book.balances.insert(to.clone(), credited);
        Ok(())
    }
}

impl Ledger for TokenLedger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Amount {
        self.books
            .get(asset)
            .map(|book| book.balance(account))
            .unwrap_or(0)
    }

    fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount {
        self.books
            .get(asset)
            .map(|book| book.allowance(owner, spender))
            .unwrap_or(0)
    }

    fn total_supply(&self, asset: &AssetId) -> Amount {
        self.books
            .get(asset)
            .map(|book| book.total_supply)
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.move_balance(asset, from, to, amount)?;
        self.record(LedgerEvent::Transfer {
            asset: asset.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
            spender: None,
        });
        debug!(%asset, %from, %to, amount, "transfer");
        Ok(())
    }

    fn approve(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.book_mut(asset)?.set_allowance(owner, spender, amount);
        self.record(LedgerEvent::Approval {
            asset: asset.clone(),
            owner: owner.clone(),
            spender: spender.clone(),
            allowance: amount,
        });
        Ok(())
    }

    fn increase_allowance(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        added: Amount,
    ) -> Result<()> {
        let current = self.book(asset)?.allowance(owner, spender);
        let updated = current.try_add(added, "allowance increase")?;
        self.approve(asset, owner, spender, updated)
    }

    fn decrease_allowance(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        subtracted: Amount,
    ) -> Result<()> {
        let current = self.book(asset)?.allowance(owner, spender);
        if current < subtracted {
            return Err(ProtocolError::InsufficientAllowance {
                asset: asset.clone(),
                owner: owner.clone(),
                spender: spender.clone(),
                requested: subtracted,
                allowed: current,
            });
        }
        self.approve(asset, owner, spender, current - subtracted)
    }

    fn transfer_from(
        &mut self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let allowed = self.book(asset)?.allowance(owner, spender);
        if allowed < amount {
            return Err(ProtocolError::InsufficientAllowance {
                asset: asset.clone(),
                owner: owner.clone(),
                spender: spender.clone(),
                requested: amount,
                allowed,
            });
        }

        self.move_balance(asset, owner, to, amount)?;
        if allowed != UNLIMITED_ALLOWANCE {
            self.book_mut(asset)?
                .set_allowance(owner, spender, allowed - amount);
        }
        self.record(LedgerEvent::Transfer {
            asset: asset.clone(),
            from: owner.clone(),
            to: to.clone(),
            amount,
            spender: Some(spender.clone()),
        });
        debug!(%asset, %owner, %spender, %to, amount, "transfer_from");
        Ok(())
    }
}
