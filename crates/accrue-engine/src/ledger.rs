//! Token balances and the transfer capability.

use std::collections::BTreeMap;

use accrue_types::{AccountId, AssetId, Decimal};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Moves tokens between accounts.
///
/// Returns `false` when the transfer cannot be made. Callers treat `false`
/// as a reason to abort the whole operation.
pub trait Transfer {
    fn transfer_from(&mut self, asset: &AssetId, from: AccountId, to: AccountId, amount: Decimal) -> bool;
}

/// Per-asset, per-account balances. Zero balances are not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    balances: BTreeMap<AssetId, BTreeMap<AccountId, Decimal>>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, asset: &AssetId, account: AccountId) -> Decimal {
        self.balances
            .get(asset)
            .and_then(|accounts| accounts.get(&account))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Create `amount` new tokens in `to`'s balance.
    pub fn mint(&mut self, asset: &AssetId, to: AccountId, amount: Decimal) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(to)
            .or_insert(Decimal::ZERO);
        *balance = balance.checked_add(amount).ok_or(EngineError::Overflow)?;
        tracing::trace!(%asset, %to, amount = %amount, "ledger: minted");
        Ok(())
    }

    /// Overwrite a balance. Used when loading persisted state.
    pub fn set(&mut self, asset: &AssetId, account: AccountId, amount: Decimal) {
        if !amount.is_zero() {
            self.balances
                .entry(asset.clone())
                .or_default()
                .insert(account, amount);
            return;
        }
        if let Some(accounts) = self.balances.get_mut(asset) {
            accounts.remove(&account);
            if accounts.is_empty() {
                self.balances.remove(asset);
            }
        }
    }

    /// Sum of all balances of `asset`.
    pub fn total_supply(&self, asset: &AssetId) -> Decimal {
        self.balances
            .get(asset)
            .map(|accounts| accounts.values().fold(Decimal::ZERO, |acc, b| acc.saturating_add(*b)))
            .unwrap_or(Decimal::ZERO)
    }

    /// Every non-zero balance as `(asset, account, amount)`.
    pub fn entries(&self) -> impl Iterator<Item = (&AssetId, AccountId, Decimal)> {
        self.balances.iter().flat_map(|(asset, accounts)| {
            accounts
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(move |(account, amount)| (asset, *account, *amount))
        })
    }
}

impl Transfer for Balances {
    fn transfer_from(&mut self, asset: &AssetId, from: AccountId, to: AccountId, amount: Decimal) -> bool {
        if amount.is_zero() {
            return true;
        }
        if to.is_zero() {
            tracing::warn!(%asset, %from, "ledger: transfer to zero account refused");
            return false;
        }
        let available = self.balance_of(asset, from);
        let Some(remaining) = available.checked_sub(amount) else {
            tracing::warn!(
                %asset,
                %from,
                %to,
                amount = %amount,
                available = %available,
                "ledger: insufficient balance"
            );
            return false;
        };
        let Some(credited) = self.balance_of(asset, to).checked_add(amount) else {
            return false;
        };
        if from == to {
            return true;
        }
        let accounts = self.balances.entry(asset.clone()).or_default();
        // Emptied balances are dropped so equal states compare equal.
        if remaining.is_zero() {
            accounts.remove(&from);
        } else {
            accounts.insert(from, remaining);
        }
        accounts.insert(to, credited);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AccountId = AccountId::from_bytes([0xA; 32]);
    const B: AccountId = AccountId::from_bytes([0xB; 32]);

    fn lp() -> AssetId {
        AssetId::new("LP")
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut balances = Balances::new();
        balances.mint(&lp(), A, Decimal::from_int(10)).expect("mint");

        assert!(balances.transfer_from(&lp(), A, B, Decimal::from_int(4)));
        assert_eq!(balances.balance_of(&lp(), A), Decimal::from_int(6));
        assert_eq!(balances.balance_of(&lp(), B), Decimal::from_int(4));
        assert_eq!(balances.total_supply(&lp()), Decimal::from_int(10));
    }

    #[test]
    fn test_insufficient_balance_refused() {
        let mut balances = Balances::new();
        balances.mint(&lp(), A, Decimal::from_int(1)).expect("mint");
        let before = balances.clone();

        assert!(!balances.transfer_from(&lp(), A, B, Decimal::from_int(2)));
        assert_eq!(balances, before);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let mut balances = Balances::new();
        balances.mint(&lp(), A, Decimal::from_int(3)).expect("mint");
        assert!(balances.transfer_from(&lp(), A, A, Decimal::from_int(2)));
        assert_eq!(balances.balance_of(&lp(), A), Decimal::from_int(3));
    }

    #[test]
    fn test_assets_are_separate() {
        let mut balances = Balances::new();
        balances.mint(&lp(), A, Decimal::from_int(3)).expect("mint");
        assert!(!balances.transfer_from(&AssetId::new("NMX"), A, B, Decimal::ONE));
    }

    #[test]
    fn test_emptied_balance_is_dropped() {
        let mut moved = Balances::new();
        moved.mint(&lp(), A, Decimal::from_int(3)).expect("mint");
        assert!(moved.transfer_from(&lp(), A, B, Decimal::from_int(3)));

        let mut direct = Balances::new();
        direct.set(&lp(), B, Decimal::from_int(3));
        assert_eq!(moved, direct);
    }

    #[test]
    fn test_entries_skip_zero() {
        let mut balances = Balances::new();
        balances.mint(&lp(), A, Decimal::from_int(3)).expect("mint");
        assert!(balances.transfer_from(&lp(), A, B, Decimal::from_int(3)));
        let entries: Vec<_> = balances.entries().collect();
        assert_eq!(entries, vec![(&lp(), B, Decimal::from_int(3))]);
    }
}
