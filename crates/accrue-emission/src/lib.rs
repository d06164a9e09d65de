//! # accrue-emission
//!
//! Piecewise-geometric token emission.
//!
//! An emission stream is a sequence of schedule items. Each item runs for a
//! number of fixed-length cycles and multiplies the per-second emission rate
//! at the end of every cycle. Advancing the stream to a timestamp integrates
//! the elapsed seconds into a supply delta, stepping once per cycle boundary
//! crossed so that a call after a long gap stays cheap.
//!
//! ## Formula
//!
//! ```text
//! delta = sum over segments (segment_seconds * next_tick_supply)
//! next_tick_supply *= cycle_completeness_multiplier   (at each cycle end)
//! ```
//!
//! ## Modules
//!
//! - [`item`] — Schedule items and fraction validation
//! - [`state`] — Per-stream schedule cursor
//! - [`schedule`] — `advance` / `advance_split`
//! - [`pools`] — Time-indexed pool distribution overlay
//! - [`minter`] — Schedule-backed supplier with pool ownership and output rate

pub mod item;
pub mod minter;
pub mod pools;
pub mod schedule;
pub mod state;

pub use item::EmissionScheduleItem;
pub use minter::{Minter, MinterRecord, PoolAllocation};
pub use pools::{PoolDistributionItem, PoolDistributionSchedule};
pub use schedule::{EmissionSchedule, PoolEmission};
pub use state::EmissionScheduleState;

use accrue_types::{AccessError, AccountId, Decimal, PoolId};

/// Error types for emission operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmissionError {
    /// Cycle completeness multiplier outside `(0, 1]`.
    #[error("cycle multiplier must be in (0, 1], got {0}")]
    InvalidMultiplier(Decimal),

    /// A single share or factor above 1.
    #[error("share {share} for pool {pool} exceeds 1")]
    InvalidShare {
        /// Index of the offending pool.
        pool: usize,
        /// The rejected share.
        share: Decimal,
    },

    /// Shares or factors summing above 1.
    #[error("shares sum to {0}, which exceeds 1")]
    SharesExceedOne(Decimal),

    /// More shares than configured pools.
    #[error("{len} shares given for {pool_count} pools")]
    TooManyShares {
        /// Number of shares supplied.
        len: usize,
        /// Number of pools.
        pool_count: usize,
    },

    /// Pool distribution items out of chronological order.
    #[error("pool distribution items must have increasing start times")]
    UnorderedDistribution,

    /// Output rate outside `(0, 1]`.
    #[error("output rate must be in (0, 1], got {0}")]
    InvalidOutputRate(Decimal),

    /// Pool index out of range.
    #[error("unknown pool {0}")]
    UnknownPool(PoolId),

    /// The proposed pool owner already owns this pool.
    #[error("{0} already owns this pool")]
    SameOwner(AccountId),

    /// The proposed pool owner already owns a different pool.
    #[error("{account} already owns {pool}")]
    OwnsOtherPool {
        /// The proposed owner.
        account: AccountId,
        /// The pool it already owns.
        pool: PoolId,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,

    /// Caller failed an access precondition.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Convenience result type for emission operations.
pub type Result<T> = std::result::Result<T, EmissionError>;
