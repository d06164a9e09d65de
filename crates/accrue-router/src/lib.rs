//! # accrue-router
//!
//! Weighted distribution of one upstream supply across several participants.
//!
//! A router pulls from its own upstream source (typically a minter pool it
//! owns) and apportions every pull across its participants by weight. Each
//! participant collects its share when it next calls [`DistributionRouter::mint`].
//!
//! ## Modules
//!
//! - [`weights`] — Weight map validation
//! - [`router`] — The distribution router

pub mod router;
pub mod weights;

pub use router::DistributionRouter;
pub use weights::validate_weights;

use accrue_types::{AccessError, AccountId, Decimal};

/// Error types for router operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// A weight outside `(0, 1]`.
    #[error("weight {weight} for {account} must be in (0, 1]")]
    InvalidWeight {
        /// The participant.
        account: AccountId,
        /// The rejected weight.
        weight: Decimal,
    },

    /// Weights summing above 1.
    #[error("weights sum to {0}, which exceeds 1")]
    WeightsExceedOne(Decimal),

    /// The zero account cannot participate.
    #[error("zero account cannot be a participant")]
    ZeroAccount,

    /// Arithmetic overflow.
    #[error("arithmetic overflow in distribution")]
    Overflow,

    /// Caller failed an access precondition.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Convenience result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
