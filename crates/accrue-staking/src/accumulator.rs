//! Per-service reward accumulator.
//!
//! `historical_reward_rate` is the cumulative reward earned per staked unit
//! since the service started. It never decreases.
//!
//! Supply that arrives while nothing is staked cannot be divided, so it waits
//! in `undistributed` and is folded in at the first settlement that finds a
//! non-zero stake. Truncation dust from the division waits there too, which
//! keeps `rate increments * total_staked + undistributed` equal to everything
//! supplied.

use accrue_types::Decimal;
use serde::{Deserialize, Serialize};

use crate::position::StakerPosition;
use crate::{Result, StakingError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    /// Sum of all position amounts.
    pub total_staked: Decimal,
    /// Cumulative reward per staked unit.
    pub historical_reward_rate: Decimal,
    /// Supplied but not yet folded into the rate.
    #[serde(default)]
    pub undistributed: Decimal,
}

impl RewardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `supplied` (plus anything carried forward) into the rate.
    ///
    /// Returns the rate increment, zero when nothing is staked.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Overflow`] on arithmetic overflow (state untouched)
    pub fn fold(&mut self, supplied: Decimal) -> Result<Decimal> {
        let available = self
            .undistributed
            .checked_add(supplied)
            .ok_or(StakingError::Overflow)?;
        if available.is_zero() {
            return Ok(Decimal::ZERO);
        }
        if self.total_staked.is_zero() {
            tracing::trace!(carried = %available, "staking: nothing staked, carrying supply forward");
            self.undistributed = available;
            return Ok(Decimal::ZERO);
        }

        let increment = available
            .checked_div(self.total_staked)
            .ok_or(StakingError::Overflow)?;
        let distributed = increment
            .checked_mul(self.total_staked)
            .ok_or(StakingError::Overflow)?;
        let rate = self
            .historical_reward_rate
            .checked_add(increment)
            .ok_or(StakingError::Overflow)?;

        self.historical_reward_rate = rate;
        self.undistributed = available.saturating_sub(distributed);

        tracing::trace!(
            supplied = %supplied,
            increment = %increment,
            rate = %rate,
            total_staked = %self.total_staked,
            "staking: folded supply into reward rate"
        );
        Ok(increment)
    }

    /// Reward owed to `position` at the current rate, not counting `accrued`.
    pub fn owed(&self, position: &StakerPosition) -> Result<Decimal> {
        position.owed(self.historical_reward_rate)
    }
}
