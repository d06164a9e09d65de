//! The distribution router.
//!
//! ## Crediting
//!
//! Every pull credits `total * weight` to each participant's pending bucket.
//! The caller's bucket is then paid out whole and the paid amount is returned.
//! The return value is the amount transferred; nothing credits the caller a
//! second time. Other participants' buckets wait until they call.

use std::collections::BTreeMap;

use accrue_types::{AccountId, Decimal, Governance};
use serde::{Deserialize, Serialize};

use crate::weights::validate_weights;
use crate::{Result, RouterError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRouter {
    id: AccountId,
    governance: Governance,
    weights: BTreeMap<AccountId, Decimal>,
    #[serde(default)]
    pending: BTreeMap<AccountId, Decimal>,
    #[serde(default)]
    unallocated: Decimal,
}

impl DistributionRouter {
    /// A router identified as `id` with a validated weight map.
    pub fn new(id: AccountId, owner: AccountId, weights: BTreeMap<AccountId, Decimal>) -> Result<Self> {
        validate_weights(&weights)?;
        Ok(Self {
            id,
            governance: Governance::new(owner),
            weights,
            pending: BTreeMap::new(),
            unallocated: Decimal::ZERO,
        })
    }

    /// The identity the router pulls its upstream supply as.
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn weights(&self) -> &BTreeMap<AccountId, Decimal> {
        &self.weights
    }

    /// Weight of `account`, zero for non-participants.
    pub fn weight(&self, account: AccountId) -> Decimal {
        self.weights.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_weight(&self) -> Decimal {
        Decimal::checked_sum(self.weights.values().copied()).unwrap_or(Decimal::MAX)
    }

    /// Credited but not yet collected by `account`.
    pub fn pending(&self, account: AccountId) -> Decimal {
        self.pending.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    /// Everything pulled so far that no weight covered.
    pub fn unallocated(&self) -> Decimal {
        self.unallocated
    }

    /// Pull once from `upstream`, credit every participant and pay the caller.
    ///
    /// A caller without weight gets zero: `upstream` is not called and nothing
    /// changes. Returns the amount transferred to the caller.
    ///
    /// # Errors
    ///
    /// - Whatever `upstream` returns (nothing changes)
    /// - [`RouterError::Overflow`] on arithmetic overflow (nothing changes)
    pub fn mint<F, E>(&mut self, caller: AccountId, upstream: F) -> std::result::Result<Decimal, E>
    where
        F: FnOnce() -> std::result::Result<Decimal, E>,
        E: From<RouterError>,
    {
        if self.weight(caller).is_zero() {
            tracing::trace!(router = %self.id, %caller, "router: mint by non participant");
            return Ok(Decimal::ZERO);
        }
        let total = upstream()?;
        self.credit(total)?;
        let paid = self.pending.remove(&caller).unwrap_or(Decimal::ZERO);
        tracing::debug!(
            router = %self.id,
            %caller,
            pulled = %total,
            paid = %paid,
            "router: minted"
        );
        Ok(paid)
    }

    /// Credit `total` to the participants' buckets by weight.
    ///
    /// Truncation dust and the share no weight covers go to `unallocated`.
    pub fn credit(&mut self, total: Decimal) -> Result<()> {
        if total.is_zero() {
            return Ok(());
        }
        let mut pending = self.pending.clone();
        let mut allocated = Decimal::ZERO;
        for (account, weight) in &self.weights {
            let share = total.checked_mul(*weight).ok_or(RouterError::Overflow)?;
            let bucket = pending.entry(*account).or_insert(Decimal::ZERO);
            *bucket = bucket.checked_add(share).ok_or(RouterError::Overflow)?;
            allocated = allocated.checked_add(share).ok_or(RouterError::Overflow)?;
        }
        let rest = total
            .checked_sub(allocated)
            .ok_or(RouterError::WeightsExceedOne(allocated))?;
        let unallocated = self
            .unallocated
            .checked_add(rest)
            .ok_or(RouterError::Overflow)?;

        self.pending = pending;
        self.unallocated = unallocated;
        Ok(())
    }

    /// Replace the weight map. Owner only.
    ///
    /// Supply that accrued under the old weights is pulled and credited by
    /// the old weights first. Pending buckets are kept; participants missing
    /// from `weights` drop to zero weight.
    pub fn change_weights<F, E>(
        &mut self,
        caller: AccountId,
        weights: BTreeMap<AccountId, Decimal>,
        upstream: F,
    ) -> std::result::Result<(), E>
    where
        F: FnOnce() -> std::result::Result<Decimal, E>,
        E: From<RouterError>,
    {
        self.governance
            .require_owner(caller)
            .map_err(RouterError::from)?;
        let total_weight = validate_weights(&weights)?;

        let total = upstream()?;
        self.credit(total)?;

        tracing::info!(
            router = %self.id,
            participants = weights.len(),
            total_weight = %total_weight,
            settled = %total,
            "router: weights changed"
        );
        self.weights = weights;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> Result<()> {
        Ok(self.governance.transfer_ownership(caller, new_owner)?)
    }
}
