//! Per-stream schedule cursor.

use accrue_types::{Decimal, Timestamp};
use serde::{Deserialize, Serialize};

/// Cursor into the schedule for one emission stream.
///
/// Persists for the lifetime of the stream. `time` never decreases and
/// `item_index == items.len()` means the stream is exhausted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmissionScheduleState {
    /// Last fully processed timestamp.
    pub time: Timestamp,
    /// Index of the current schedule item.
    pub item_index: u32,
    /// Cycles completed within the current item.
    pub cycle_index: u32,
    /// When the current cycle began.
    pub cycle_start_time: Timestamp,
    /// Emission rate (units per second) for the next elapsed second.
    pub next_tick_supply: Decimal,
}

impl EmissionScheduleState {
    /// A stream that starts emitting `first_tick_supply` per second at `start_time`.
    pub fn new(first_tick_supply: Decimal, start_time: Timestamp) -> Self {
        Self {
            time: start_time,
            item_index: 0,
            cycle_index: 0,
            cycle_start_time: start_time,
            next_tick_supply: first_tick_supply,
        }
    }

    /// `true` once every item of a schedule of `item_count` items has completed.
    pub fn is_exhausted(&self, item_count: usize) -> bool {
        self.item_index as usize >= item_count
    }
}
