//! Time-indexed pool distribution overlay.
//!
//! A step function from absolute time to per-pool allocation factors. It is
//! independent of the cycle math, so a minter can swap the per-item shares for
//! an overlay without touching the schedule.

use accrue_types::{Decimal, PoolId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::item::validate_fractions;
use crate::{EmissionError, Result};

/// Factors in force from `start_time` until the next item starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDistributionItem {
    pub start_time: Timestamp,
    pub pool_factors: Vec<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDistributionSchedule {
    items: Vec<PoolDistributionItem>,
    pool_count: usize,
}

impl PoolDistributionSchedule {
    /// Build from absolute items.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::UnorderedDistribution`] unless start times strictly increase
    /// - [`EmissionError::TooManyShares`] if a factor vector is longer than `pool_count`
    /// - [`EmissionError::InvalidShare`] / [`EmissionError::SharesExceedOne`] for bad factors
    pub fn new(items: Vec<PoolDistributionItem>, pool_count: usize) -> Result<Self> {
        if items
            .windows(2)
            .any(|pair| pair[1].start_time <= pair[0].start_time)
        {
            return Err(EmissionError::UnorderedDistribution);
        }
        for item in &items {
            if item.pool_factors.len() > pool_count {
                return Err(EmissionError::TooManyShares {
                    len: item.pool_factors.len(),
                    pool_count,
                });
            }
            validate_fractions(&item.pool_factors)?;
        }
        Ok(Self { items, pool_count })
    }

    /// Build from `(duration, factors)` pairs laid end to end from `start`.
    ///
    /// Item `i` starts at `start + sum(durations[..i])`. The last duration
    /// only matters for overflow checking; the last item stays in force.
    pub fn from_relative(
        start: Timestamp,
        relative: Vec<(u64, Vec<Decimal>)>,
        pool_count: usize,
    ) -> Result<Self> {
        let mut at = start;
        let mut items = Vec::with_capacity(relative.len());
        for (duration, pool_factors) in relative {
            items.push(PoolDistributionItem {
                start_time: at,
                pool_factors,
            });
            at = at.checked_add(duration).ok_or(EmissionError::Overflow)?;
        }
        Self::new(items, pool_count)
    }

    pub fn items(&self) -> &[PoolDistributionItem] {
        &self.items
    }

    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Factors in force at `time`, zero-padded to the pool count.
    ///
    /// All zeros before the first item starts.
    pub fn pool_factors(&self, time: Timestamp) -> Vec<Decimal> {
        let mut factors = self
            .items
            .iter()
            .rev()
            .find(|item| item.start_time <= time)
            .map(|item| item.pool_factors.clone())
            .unwrap_or_default();
        factors.resize(self.pool_count, Decimal::ZERO);
        factors
    }

    /// `pool_factors(time)[pool] * total_supply`, truncated.
    pub fn pool_supply(
        &self,
        time: Timestamp,
        pool: PoolId,
        total_supply: Decimal,
    ) -> Result<Decimal> {
        if pool.index() >= self.pool_count {
            return Err(EmissionError::UnknownPool(pool));
        }
        let factor = self.pool_factors(time)[pool.index()];
        total_supply
            .checked_mul(factor)
            .ok_or(EmissionError::Overflow)
    }

    /// The first item start strictly after `time`, if any.
    pub fn next_change_after(&self, time: Timestamp) -> Option<Timestamp> {
        self.items
            .iter()
            .map(|item| item.start_time)
            .find(|start| *start > time)
    }
}
