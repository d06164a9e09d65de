//! Schedule-backed supplier.
//!
//! The minter owns the single emission stream of a deployment. Every
//! settlement advances the stream to `now`, scales what was produced by the
//! output rate and credits each pool's pending bucket. A pool's owner drains
//! its bucket with [`Minter::supply`].
//!
//! Each pool has at most one owner and an account owns at most one pool, so a
//! bucket can only ever be drained by the service it was meant for.

use accrue_types::{AccessError, AccountId, Decimal, Governance, PoolId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::pools::PoolDistributionSchedule;
use crate::schedule::{EmissionSchedule, PoolEmission};
use crate::state::EmissionScheduleState;
use crate::{EmissionError, Result};

/// How emitted supply is divided among pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolAllocation {
    /// Use the `pool_shares` of the schedule item each segment belongs to.
    ItemShares,
    /// Use the factors of an overlay in force at the start of each segment.
    Overlay(PoolDistributionSchedule),
}

/// The mutable part of a minter, as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinterRecord {
    pub governance: Governance,
    pub state: EmissionScheduleState,
    pub output_rate: Decimal,
    pub pool_owners: Vec<Option<AccountId>>,
    pub pending: Vec<Decimal>,
    pub unallocated: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Minter {
    governance: Governance,
    schedule: EmissionSchedule,
    allocation: PoolAllocation,
    state: EmissionScheduleState,
    output_rate: Decimal,
    pool_owners: Vec<Option<AccountId>>,
    pending: Vec<Decimal>,
    unallocated: Decimal,
}

impl Minter {
    /// A minter whose stream starts emitting `first_tick_supply` per second at
    /// `start_time`. Pools start without owners and the output rate is 1.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::TooManyShares`] if an overlay covers a different
    ///   number of pools than the schedule
    pub fn new(
        owner: AccountId,
        schedule: EmissionSchedule,
        allocation: PoolAllocation,
        first_tick_supply: Decimal,
        start_time: Timestamp,
    ) -> Result<Self> {
        let pool_count = schedule.pool_count();
        if let PoolAllocation::Overlay(overlay) = &allocation {
            if overlay.pool_count() != pool_count {
                return Err(EmissionError::TooManyShares {
                    len: overlay.pool_count(),
                    pool_count,
                });
            }
        }
        Ok(Self {
            governance: Governance::new(owner),
            schedule,
            allocation,
            state: EmissionScheduleState::new(first_tick_supply, start_time),
            output_rate: Decimal::ONE,
            pool_owners: vec![None; pool_count],
            pending: vec![Decimal::ZERO; pool_count],
            unallocated: Decimal::ZERO,
        })
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn owner(&self) -> AccountId {
        self.governance.owner()
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    pub fn allocation(&self) -> &PoolAllocation {
        &self.allocation
    }

    pub fn state(&self) -> &EmissionScheduleState {
        &self.state
    }

    pub fn output_rate(&self) -> Decimal {
        self.output_rate
    }

    pub fn pool_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pool_owner(&self, pool: PoolId) -> Option<AccountId> {
        self.pool_owners.get(pool.index()).copied().flatten()
    }

    /// The pool `account` owns, if any.
    pub fn pool_of(&self, account: AccountId) -> Option<PoolId> {
        self.pool_owners
            .iter()
            .position(|owner| *owner == Some(account))
            .map(PoolId)
    }

    /// Settled but not yet supplied amount of `pool`.
    pub fn pending(&self, pool: PoolId) -> Decimal {
        self.pending
            .get(pool.index())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Everything emitted so far that belonged to no pool.
    pub fn unallocated(&self) -> Decimal {
        self.unallocated
    }

    /// Advance the stream to `now` and credit the pool buckets.
    ///
    /// Returns what this call credited, after the output rate.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::Overflow`] on arithmetic overflow (nothing changes)
    pub fn settle(&mut self, now: Timestamp) -> Result<PoolEmission> {
        let mut state = self.state.clone();
        let produced = match &self.allocation {
            PoolAllocation::ItemShares => self.schedule.advance_split(&mut state, now)?,
            PoolAllocation::Overlay(overlay) => {
                let mut emission = PoolEmission::empty(self.pool_count());
                while now > state.time && !self.schedule.is_exhausted(&state) {
                    let cut = overlay
                        .next_change_after(state.time)
                        .map_or(now, |change| change.min(now));
                    let factors = overlay.pool_factors(state.time);
                    let delta = self.schedule.advance(&mut state, cut)?;
                    emission.add_split(delta, &factors)?;
                }
                emission
            }
        };

        let credited = produced.scaled(self.output_rate)?;
        let pending = self
            .pending
            .iter()
            .zip(&credited.pools)
            .map(|(bucket, amount)| bucket.checked_add(*amount).ok_or(EmissionError::Overflow))
            .collect::<Result<Vec<_>>>()?;
        let unallocated = self
            .unallocated
            .checked_add(credited.unallocated)
            .ok_or(EmissionError::Overflow)?;

        self.state = state;
        self.pending = pending;
        self.unallocated = unallocated;

        if !credited.is_zero() {
            tracing::debug!(
                now,
                total = %credited.total,
                unallocated = %credited.unallocated,
                output_rate = %self.output_rate,
                "emission: settled stream"
            );
        }
        Ok(credited)
    }

    /// Settle and hand the caller its pool's whole bucket.
    ///
    /// A caller that owns no pool gets zero and nothing is settled.
    pub fn supply(&mut self, caller: AccountId, now: Timestamp) -> Result<Decimal> {
        let Some(pool) = self.pool_of(caller) else {
            tracing::trace!(%caller, "emission: supply requested by non pool owner");
            return Ok(Decimal::ZERO);
        };
        self.settle(now)?;
        let amount = self
            .pending
            .get_mut(pool.index())
            .map(std::mem::take)
            .unwrap_or(Decimal::ZERO);
        tracing::debug!(%caller, %pool, amount = %amount, "emission: supplied pool");
        Ok(amount)
    }

    /// Hand `pool` to `new_owner`.
    ///
    /// Allowed for the minter owner and for the pool's current owner. The
    /// pending bucket stays with the pool.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::UnknownPool`] if `pool` is out of range
    /// - [`AccessError::NotOwner`] if the caller is neither owner
    /// - [`AccessError::ZeroOwner`] if `new_owner` is the zero account
    /// - [`EmissionError::SameOwner`] if `new_owner` already owns `pool`
    /// - [`EmissionError::OwnsOtherPool`] if `new_owner` owns another pool
    pub fn transfer_pool_ownership(
        &mut self,
        caller: AccountId,
        pool: PoolId,
        new_owner: AccountId,
    ) -> Result<()> {
        let current = *self
            .pool_owners
            .get(pool.index())
            .ok_or(EmissionError::UnknownPool(pool))?;
        if current != Some(caller) {
            self.governance.require_owner(caller)?;
        }
        if new_owner.is_zero() {
            return Err(AccessError::ZeroOwner.into());
        }
        if current == Some(new_owner) {
            return Err(EmissionError::SameOwner(new_owner));
        }
        if let Some(other) = self.pool_of(new_owner) {
            return Err(EmissionError::OwnsOtherPool {
                account: new_owner,
                pool: other,
            });
        }
        if let Some(slot) = self.pool_owners.get_mut(pool.index()) {
            *slot = Some(new_owner);
        }
        tracing::info!(%pool, from = ?current, to = %new_owner, "emission: pool ownership transferred");
        Ok(())
    }

    /// Change the output rate. Owner only, `rate` in `(0, 1]`.
    ///
    /// The stream is settled to `now` at the old rate first, so the new rate
    /// applies only to time processed afterwards.
    pub fn set_output_rate(&mut self, caller: AccountId, rate: Decimal, now: Timestamp) -> Result<()> {
        self.governance.require_owner(caller)?;
        if rate.is_zero() || rate > Decimal::ONE {
            return Err(EmissionError::InvalidOutputRate(rate));
        }
        self.settle(now)?;
        tracing::info!(from = %self.output_rate, to = %rate, "emission: output rate changed");
        self.output_rate = rate;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> Result<()> {
        Ok(self.governance.transfer_ownership(caller, new_owner)?)
    }

    /// Per-second emission currently flowing to `pool`.
    pub fn reward_rate(&self, pool: PoolId) -> Result<Decimal> {
        if pool.index() >= self.pool_count() {
            return Err(EmissionError::UnknownPool(pool));
        }
        let Some(item) = self
            .schedule
            .items()
            .iter()
            .skip(self.state.item_index as usize)
            .find(|item| !item.is_degenerate())
        else {
            return Ok(Decimal::ZERO);
        };
        let share = match &self.allocation {
            PoolAllocation::ItemShares => item.share(pool.index()),
            PoolAllocation::Overlay(overlay) => overlay
                .pool_factors(self.state.time)
                .get(pool.index())
                .copied()
                .unwrap_or(Decimal::ZERO),
        };
        self.state
            .next_tick_supply
            .checked_mul(share)
            .and_then(|rate| rate.checked_mul(self.output_rate))
            .ok_or(EmissionError::Overflow)
    }

    /// Copy out the mutable state.
    pub fn snapshot(&self) -> MinterRecord {
        MinterRecord {
            governance: self.governance.clone(),
            state: self.state.clone(),
            output_rate: self.output_rate,
            pool_owners: self.pool_owners.clone(),
            pending: self.pending.clone(),
            unallocated: self.unallocated,
        }
    }

    /// Replace the mutable state with a persisted record.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::TooManyShares`] if the record covers a different
    ///   number of pools
    /// - [`EmissionError::InvalidOutputRate`] if the stored rate is out of range
    pub fn restore(&mut self, record: MinterRecord) -> Result<()> {
        let pool_count = self.pool_count();
        for len in [record.pool_owners.len(), record.pending.len()] {
            if len != pool_count {
                return Err(EmissionError::TooManyShares { len, pool_count });
            }
        }
        if record.output_rate.is_zero() || record.output_rate > Decimal::ONE {
            return Err(EmissionError::InvalidOutputRate(record.output_rate));
        }
        self.governance = record.governance;
        self.state = record.state;
        self.output_rate = record.output_rate;
        self.pool_owners = record.pool_owners;
        self.pending = record.pending;
        self.unallocated = record.unallocated;
        Ok(())
    }
}
