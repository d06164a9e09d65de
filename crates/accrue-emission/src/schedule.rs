//! Schedule advancement.
//!
//! [`EmissionSchedule::advance`] walks a state forward to `now` one segment at
//! a time, where a segment ends at `now` or at the end of the current cycle,
//! whichever comes first. The loop runs once per cycle boundary crossed, not
//! once per elapsed second.
//!
//! The walk runs on a copy of the state and commits only on success, so an
//! overflow leaves the caller's state untouched.

use accrue_types::{Decimal, Timestamp};
use serde::{Deserialize, Serialize};

use crate::item::EmissionScheduleItem;
use crate::state::EmissionScheduleState;
use crate::{EmissionError, Result};

/// Emission produced by one advance, split across pools.
///
/// `total == sum(pools) + unallocated` always holds exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEmission {
    pub total: Decimal,
    pub pools: Vec<Decimal>,
    pub unallocated: Decimal,
}

impl PoolEmission {
    pub fn empty(pool_count: usize) -> Self {
        Self {
            total: Decimal::ZERO,
            pools: vec![Decimal::ZERO; pool_count],
            unallocated: Decimal::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total.is_zero()
    }

    /// Amount allocated to `pool`, zero if out of range.
    pub fn pool(&self, pool: usize) -> Decimal {
        self.pools.get(pool).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add `delta`, splitting it by `fractions` (which must sum to at most 1).
    ///
    /// Each pool part is truncated; the truncation dust lands in
    /// `unallocated` so nothing is created or lost.
    pub fn add_split(&mut self, delta: Decimal, fractions: &[Decimal]) -> Result<()> {
        let mut allocated = Decimal::ZERO;
        for (index, pool) in self.pools.iter_mut().enumerate() {
            let share = fractions.get(index).copied().unwrap_or(Decimal::ZERO);
            let part = delta.checked_mul(share).ok_or(EmissionError::Overflow)?;
            *pool = pool.checked_add(part).ok_or(EmissionError::Overflow)?;
            allocated = allocated.checked_add(part).ok_or(EmissionError::Overflow)?;
        }
        let rest = delta
            .checked_sub(allocated)
            .ok_or(EmissionError::SharesExceedOne(allocated))?;
        self.unallocated = self
            .unallocated
            .checked_add(rest)
            .ok_or(EmissionError::Overflow)?;
        self.total = self
            .total
            .checked_add(delta)
            .ok_or(EmissionError::Overflow)?;
        Ok(())
    }

    /// Every component multiplied by `rate`, truncated.
    ///
    /// The scaled total is recomputed from the scaled parts so the sum
    /// invariant still holds.
    pub fn scaled(&self, rate: Decimal) -> Result<Self> {
        let pools = self
            .pools
            .iter()
            .map(|p| p.checked_mul(rate).ok_or(EmissionError::Overflow))
            .collect::<Result<Vec<_>>>()?;
        let unallocated = self
            .unallocated
            .checked_mul(rate)
            .ok_or(EmissionError::Overflow)?;
        let total = Decimal::checked_sum(pools.iter().copied().chain([unallocated]))
            .ok_or(EmissionError::Overflow)?;
        Ok(Self {
            total,
            pools,
            unallocated,
        })
    }

    /// Component-wise sum.
    pub fn merge(&mut self, other: &PoolEmission) -> Result<()> {
        if self.pools.len() < other.pools.len() {
            self.pools.resize(other.pools.len(), Decimal::ZERO);
        }
        for (mine, theirs) in self.pools.iter_mut().zip(&other.pools) {
            *mine = mine.checked_add(*theirs).ok_or(EmissionError::Overflow)?;
        }
        self.unallocated = self
            .unallocated
            .checked_add(other.unallocated)
            .ok_or(EmissionError::Overflow)?;
        self.total = self
            .total
            .checked_add(other.total)
            .ok_or(EmissionError::Overflow)?;
        Ok(())
    }
}

/// An ordered, immutable table of schedule items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    items: Vec<EmissionScheduleItem>,
    pool_count: usize,
}

impl EmissionSchedule {
    /// Build a schedule over `pool_count` pools.
    ///
    /// # Errors
    ///
    /// - Any item validation error
    /// - [`EmissionError::TooManyShares`] if an item lists more shares than pools
    pub fn new(items: Vec<EmissionScheduleItem>, pool_count: usize) -> Result<Self> {
        for item in &items {
            item.validate()?;
            if item.pool_shares.len() > pool_count {
                return Err(EmissionError::TooManyShares {
                    len: item.pool_shares.len(),
                    pool_count,
                });
            }
        }
        Ok(Self { items, pool_count })
    }

    pub fn items(&self) -> &[EmissionScheduleItem] {
        &self.items
    }

    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// The item the state currently points at, `None` once exhausted.
    pub fn current_item(&self, state: &EmissionScheduleState) -> Option<&EmissionScheduleItem> {
        self.items.get(state.item_index as usize)
    }

    pub fn is_exhausted(&self, state: &EmissionScheduleState) -> bool {
        state.is_exhausted(self.items.len())
    }

    /// Advance `state` to `now` and return the supply emitted in between.
    ///
    /// `now <= state.time` returns zero and leaves the state unchanged, as does
    /// any call on an exhausted stream.
    ///
    /// # Errors
    ///
    /// - [`EmissionError::Overflow`] on arithmetic overflow (state untouched)
    pub fn advance(&self, state: &mut EmissionScheduleState, now: Timestamp) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        self.walk(state, now, |_, delta| {
            total = total.checked_add(delta).ok_or(EmissionError::Overflow)?;
            Ok(())
        })?;
        Ok(total)
    }

    /// Like [`advance`](Self::advance), splitting each segment by the
    /// `pool_shares` of the item it belongs to.
    pub fn advance_split(
        &self,
        state: &mut EmissionScheduleState,
        now: Timestamp,
    ) -> Result<PoolEmission> {
        let mut emission = PoolEmission::empty(self.pool_count);
        self.walk(state, now, |item, delta| {
            emission.add_split(delta, &item.pool_shares)
        })?;
        Ok(emission)
    }

    fn walk<F>(&self, state: &mut EmissionScheduleState, now: Timestamp, mut on_segment: F) -> Result<()>
    where
        F: FnMut(&EmissionScheduleItem, Decimal) -> Result<()>,
    {
        let mut next = state.clone();
        let mut boundaries = 0u64;

        while now > next.time {
            let Some(item) = self.items.get(next.item_index as usize) else {
                break;
            };

            if item.is_degenerate() {
                next.item_index += 1;
                next.cycle_index = 0;
                next.cycle_start_time = next.time;
                continue;
            }

            let cycle_end = next
                .cycle_start_time
                .saturating_add(item.cycle_duration)
                .max(next.time);
            let boundary = now.min(cycle_end);
            let elapsed = boundary - next.time;

            let delta = next
                .next_tick_supply
                .checked_mul_int(elapsed)
                .ok_or(EmissionError::Overflow)?;
            if !delta.is_zero() {
                on_segment(item, delta)?;
            }
            next.time = boundary;

            if boundary == cycle_end {
                next.next_tick_supply = next
                    .next_tick_supply
                    .checked_mul(item.cycle_completeness_multiplier)
                    .ok_or(EmissionError::Overflow)?;
                next.cycle_index = next.cycle_index.saturating_add(1);
                next.cycle_start_time = boundary;
                boundaries += 1;
                if next.cycle_index == item.cycles_count {
                    next.cycle_index = 0;
                    next.item_index += 1;
                }
            }
        }

        if next != *state {
            tracing::trace!(
                from = state.time,
                to = next.time,
                boundaries,
                item_index = next.item_index,
                rate = %next.next_tick_supply,
                "emission: advanced schedule"
            );
        }
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_types::SECONDS_PER_DAY;

    fn d(s: &str) -> Decimal {
        s.parse().expect("decimal")
    }

    fn three_cycles_at_ninety_percent() -> EmissionSchedule {
        let items = vec![
            EmissionScheduleItem::days(30, 3, d("0.9"), vec![d("0.5"), d("0.3")]).expect("item"),
            EmissionScheduleItem::days(7, 0, d("0.994"), vec![d("1")]).expect("item"),
        ];
        EmissionSchedule::new(items, 2).expect("schedule")
    }

    #[test]
    fn test_three_cycles_compound() {
        let schedule = three_cycles_at_ninety_percent();
        let mut state = EmissionScheduleState::new(Decimal::from_int(1_000), 0);

        let emitted = schedule
            .advance(&mut state, 90 * SECONDS_PER_DAY)
            .expect("advance");

        assert_eq!(state.next_tick_supply, Decimal::from_int(729));
        assert_eq!(state.item_index, 1);
        assert_eq!(state.cycle_index, 0);
        assert_eq!(state.cycle_start_time, 90 * SECONDS_PER_DAY);
        let cycle = 30 * SECONDS_PER_DAY;
        let expected = Decimal::from_int(cycle * (1_000 + 900 + 810));
        assert_eq!(emitted, expected);
    }

    #[test]
    fn test_past_or_equal_time_is_noop() {
        let schedule = three_cycles_at_ninety_percent();
        let mut state = EmissionScheduleState::new(Decimal::from_int(1), 500);
        let before = state.clone();

        assert_eq!(schedule.advance(&mut state, 500).expect("advance"), Decimal::ZERO);
        assert_eq!(schedule.advance(&mut state, 10).expect("advance"), Decimal::ZERO);
        assert_eq!(state, before);
    }

    #[test]
    fn test_mid_cycle_advance() {
        let schedule = three_cycles_at_ninety_percent();
        let mut state = EmissionScheduleState::new(Decimal::from_int(2), 100);

        let emitted = schedule.advance(&mut state, 160).expect("advance");
        assert_eq!(emitted, Decimal::from_int(120));
        assert_eq!(state.time, 160);
        assert_eq!(state.cycle_start_time, 100);
        assert_eq!(state.next_tick_supply, Decimal::from_int(2));
    }

    #[test]
    fn test_degenerate_item_completes_immediately() {
        let items = vec![
            EmissionScheduleItem::new(0, 0, d("0.5"), vec![]).expect("item"),
            EmissionScheduleItem::new(10, 1, d("0.5"), vec![]).expect("item"),
        ];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::from_int(4), 0);

        let emitted = schedule.advance(&mut state, 10).expect("advance");
        // The degenerate item neither emits nor touches the rate.
        assert_eq!(emitted, Decimal::from_int(40));
        assert_eq!(state.next_tick_supply, Decimal::from_int(2));
        assert!(schedule.is_exhausted(&state));
    }

    #[test]
    fn test_only_degenerate_item_exhausts_stream() {
        let items = vec![EmissionScheduleItem::new(0, 0, Decimal::ONE, vec![]).expect("item")];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::from_int(4), 0);

        assert_eq!(schedule.advance(&mut state, 1_000).expect("advance"), Decimal::ZERO);
        assert!(schedule.is_exhausted(&state));
        assert_eq!(state.time, 0);
    }

    #[test]
    fn test_exhausted_stream_emits_nothing() {
        let items = vec![EmissionScheduleItem::new(10, 2, d("0.5"), vec![]).expect("item")];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::from_int(8), 0);

        let emitted = schedule.advance(&mut state, 1_000_000).expect("advance");
        assert_eq!(emitted, Decimal::from_int(80 + 40));
        assert_eq!(state.time, 20);
        let after = state.clone();

        assert_eq!(schedule.advance(&mut state, 2_000_000).expect("advance"), Decimal::ZERO);
        assert_eq!(state, after);
    }

    #[test]
    fn test_terminal_item_repeats_forever() {
        let items = vec![EmissionScheduleItem::new(10, 0, d("0.5"), vec![]).expect("item")];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::from_int(16), 0);

        let emitted = schedule.advance(&mut state, 40).expect("advance");
        assert_eq!(emitted, Decimal::from_int(160 + 80 + 40 + 20));
        assert_eq!(state.item_index, 0);
        assert_eq!(state.cycle_index, 4);
        assert_eq!(state.next_tick_supply, Decimal::ONE);
    }

    #[test]
    fn test_long_gap_terminates() {
        let items = vec![EmissionScheduleItem::new(1, 0, d("0.999999"), vec![]).expect("item")];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::from_int(1), 0);

        schedule.advance(&mut state, 200_000).expect("advance");
        assert_eq!(state.cycle_index, 200_000);
        assert!(state.next_tick_supply < Decimal::ONE);
    }

    #[test]
    fn test_split_conserves_value() {
        let schedule = three_cycles_at_ninety_percent();
        let mut state = EmissionScheduleState::new(d("3.333333333333333333"), 0);

        let emission = schedule
            .advance_split(&mut state, 100 * SECONDS_PER_DAY + 17)
            .expect("advance");

        let sum = Decimal::checked_sum(emission.pools.iter().copied().chain([emission.unallocated]))
            .expect("sum");
        assert_eq!(sum, emission.total);
        assert!(!emission.unallocated.is_zero());
    }

    #[test]
    fn test_split_uses_each_segments_item() {
        let items = vec![
            EmissionScheduleItem::new(10, 1, Decimal::ONE, vec![Decimal::ONE, Decimal::ZERO])
                .expect("item"),
            EmissionScheduleItem::new(10, 1, Decimal::ONE, vec![Decimal::ZERO, Decimal::ONE])
                .expect("item"),
        ];
        let schedule = EmissionSchedule::new(items, 2).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::ONE, 0);

        let emission = schedule.advance_split(&mut state, 15).expect("advance");
        assert_eq!(emission.pools, vec![Decimal::from_int(10), Decimal::from_int(5)]);
        assert_eq!(emission.unallocated, Decimal::ZERO);
    }

    #[test]
    fn test_too_many_shares_rejected() {
        let items = vec![EmissionScheduleItem::new(1, 1, Decimal::ONE, vec![d("0.1"); 3]).expect("item")];
        assert_eq!(
            EmissionSchedule::new(items, 2),
            Err(EmissionError::TooManyShares { len: 3, pool_count: 2 })
        );
    }

    #[test]
    fn test_overflow_leaves_state_untouched() {
        let items = vec![EmissionScheduleItem::new(u64::MAX, 1, Decimal::ONE, vec![]).expect("item")];
        let schedule = EmissionSchedule::new(items, 0).expect("schedule");
        let mut state = EmissionScheduleState::new(Decimal::MAX, 0);
        let before = state.clone();

        assert_eq!(schedule.advance(&mut state, 10), Err(EmissionError::Overflow));
        assert_eq!(state, before);
    }

    #[test]
    fn test_scaled_keeps_sum_invariant() {
        let mut emission = PoolEmission::empty(2);
        emission
            .add_split(Decimal::from_int(7), &[d("0.333"), d("0.333")])
            .expect("split");
        let scaled = emission.scaled(d("0.7")).expect("scaled");
        let sum = Decimal::checked_sum(scaled.pools.iter().copied().chain([scaled.unallocated]))
            .expect("sum");
        assert_eq!(sum, scaled.total);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn schedule() -> EmissionSchedule {
            let items = vec![
                EmissionScheduleItem::new(100, 3, d("0.9"), vec![d("0.5")]).expect("item"),
                EmissionScheduleItem::new(0, 0, d("0.5"), vec![]).expect("item"),
                EmissionScheduleItem::new(37, 5, d("0.75"), vec![d("0.2")]).expect("item"),
                EmissionScheduleItem::new(250, 0, d("0.994"), vec![Decimal::ONE]).expect("item"),
            ];
            EmissionSchedule::new(items, 1).expect("schedule")
        }

        proptest! {
            #[test]
            fn additivity(
                start in 0u64..1_000,
                steps in proptest::collection::vec(0u64..400, 1..20),
                rate in 1u64..1_000_000,
            ) {
                let schedule = schedule();
                let initial = EmissionScheduleState::new(Decimal::from_int(rate), start);

                let mut stepped = initial.clone();
                let mut sum = Decimal::ZERO;
                let mut now = start;
                for step in &steps {
                    now += step;
                    let delta = schedule.advance(&mut stepped, now).expect("advance");
                    sum = sum.checked_add(delta).expect("sum");
                }

                let mut single = initial;
                let total = schedule.advance(&mut single, now).expect("advance");

                prop_assert_eq!(sum, total);
                prop_assert_eq!(stepped, single);
            }

            #[test]
            fn idempotence(
                advance_to in 0u64..5_000,
                back in 0u64..5_000,
            ) {
                let schedule = schedule();
                let mut state = EmissionScheduleState::new(Decimal::from_int(3), 0);
                schedule.advance(&mut state, advance_to).expect("advance");
                let snapshot = state.clone();

                let again = state.time.saturating_sub(back);
                let delta = schedule.advance(&mut state, again).expect("advance");
                prop_assert_eq!(delta, Decimal::ZERO);
                prop_assert_eq!(state, snapshot);
            }
        }
    }
}
