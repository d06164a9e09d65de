//! Per-staker checkpointed positions.

use accrue_types::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, StakingError};

/// A staker's position in one service.
///
/// Created on first contact and never deleted, even at zero amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerPosition {
    pub amount: Decimal,
    /// Accumulator value at the last settlement.
    pub initial_reward_rate: Decimal,
    /// Settled, unclaimed reward.
    #[serde(default)]
    pub accrued: Decimal,
}

impl StakerPosition {
    /// An empty position checkpointed at `rate`.
    pub fn new(rate: Decimal) -> Self {
        Self {
            amount: Decimal::ZERO,
            initial_reward_rate: rate,
            accrued: Decimal::ZERO,
        }
    }

    /// Reward earned since the checkpoint at accumulator value `rate`.
    pub fn owed(&self, rate: Decimal) -> Result<Decimal> {
        rate.saturating_sub(self.initial_reward_rate)
            .checked_mul(self.amount)
            .ok_or(StakingError::Overflow)
    }

    /// Move what is owed at `rate` into `accrued` and checkpoint at `rate`.
    ///
    /// Reads `amount` before anything changes it. Returns the amount accrued.
    pub fn settle(&mut self, rate: Decimal) -> Result<Decimal> {
        let owed = self.owed(rate)?;
        self.accrued = self
            .accrued
            .checked_add(owed)
            .ok_or(StakingError::Overflow)?;
        self.initial_reward_rate = rate;
        Ok(owed)
    }

    /// `accrued` plus what is owed at `rate`.
    pub fn pending_reward(&self, rate: Decimal) -> Result<Decimal> {
        self.accrued
            .checked_add(self.owed(rate)?)
            .ok_or(StakingError::Overflow)
    }
}
