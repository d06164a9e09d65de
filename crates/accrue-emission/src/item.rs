//! Emission schedule items.

use accrue_types::{Decimal, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};

use crate::{EmissionError, Result};

/// One phase of the decay schedule. Immutable once built.
///
/// `cycles_count == 0` makes the item terminal: its cycles repeat forever.
/// The one exception is `cycles_count == 0` together with
/// `cycle_duration == 0`, which completes immediately and is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionScheduleItem {
    /// Length of one cycle in seconds.
    pub cycle_duration: u64,
    /// Cycles before the schedule moves on to the next item.
    pub cycles_count: u32,
    /// Applied to the emission rate at the end of every completed cycle.
    pub cycle_completeness_multiplier: Decimal,
    /// Fraction of this item's emission routed to each pool.
    #[serde(default)]
    pub pool_shares: Vec<Decimal>,
}

impl EmissionScheduleItem {
    /// Build a validated item.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::InvalidMultiplier`] if the multiplier is outside `(0, 1]`
    /// - [`EmissionError::InvalidShare`] if a share exceeds 1
    /// - [`EmissionError::SharesExceedOne`] if the shares sum above 1
    pub fn new(
        cycle_duration: u64,
        cycles_count: u32,
        cycle_completeness_multiplier: Decimal,
        pool_shares: Vec<Decimal>,
    ) -> Result<Self> {
        let item = Self {
            cycle_duration,
            cycles_count,
            cycle_completeness_multiplier,
            pool_shares,
        };
        item.validate()?;
        Ok(item)
    }

    /// Build an item whose cycle length is given in days.
    pub fn days(
        cycle_days: u64,
        cycles_count: u32,
        cycle_completeness_multiplier: Decimal,
        pool_shares: Vec<Decimal>,
    ) -> Result<Self> {
        let duration = cycle_days
            .checked_mul(SECONDS_PER_DAY)
            .ok_or(EmissionError::Overflow)?;
        Self::new(duration, cycles_count, cycle_completeness_multiplier, pool_shares)
    }

    /// Check the item's invariants. Used for items that were deserialized.
    pub fn validate(&self) -> Result<()> {
        let m = self.cycle_completeness_multiplier;
        if m.is_zero() || m > Decimal::ONE {
            return Err(EmissionError::InvalidMultiplier(m));
        }
        validate_fractions(&self.pool_shares)
    }

    /// Completes on the first advance without emitting.
    pub fn is_degenerate(&self) -> bool {
        self.cycles_count == 0 && self.cycle_duration == 0
    }

    /// Repeats forever once reached.
    pub fn is_terminal(&self) -> bool {
        self.cycles_count == 0 && self.cycle_duration > 0
    }

    /// Share of `pool`, zero when the item lists fewer pools.
    pub fn share(&self, pool: usize) -> Decimal {
        self.pool_shares.get(pool).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Each value at most 1 and the sum at most 1.
pub(crate) fn validate_fractions(values: &[Decimal]) -> Result<()> {
    if let Some((pool, share)) = values
        .iter()
        .enumerate()
        .find(|(_, share)| **share > Decimal::ONE)
    {
        return Err(EmissionError::InvalidShare {
            pool,
            share: *share,
        });
    }
    let sum = Decimal::checked_sum(values.iter().copied()).ok_or(EmissionError::Overflow)?;
    if sum > Decimal::ONE {
        return Err(EmissionError::SharesExceedOne(sum));
    }
    Ok(())
}
