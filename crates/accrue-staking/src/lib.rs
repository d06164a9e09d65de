//! # accrue-staking
//!
//! Pro-rata reward distribution for staking services.
//!
//! Each service keeps a reward-per-share accumulator. Supply pulled from
//! upstream is folded into the accumulator, and every staker's reward is
//! computed lazily from the difference between the current accumulator value
//! and the checkpoint taken at their last settlement. Claims cost O(1)
//! regardless of the number of stakers.
//!
//! ## Formula
//!
//! ```text
//! historical_reward_rate += supplied / total_staked
//! owed = (historical_reward_rate - checkpoint) * amount
//! ```
//!
//! ## Modules
//!
//! - [`accumulator`] — Per-service reward accumulator
//! - [`position`] — Per-staker checkpointed positions
//! - [`authorization`] — Owner-signed stake/unstake/claim authorizations
//! - [`service`] — The staking service and its settlements

pub mod accumulator;
pub mod authorization;
pub mod position;
pub mod service;

pub use accumulator::RewardState;
pub use authorization::{Authorization, AuthorizationAction, SignedAuthorization};
pub use position::StakerPosition;
pub use service::{Movement, ServiceRecord, Settlement, StakingService};

use accrue_types::{AccessError, AssetId, Decimal, Timestamp};

/// Error types for staking operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StakingError {
    /// Unstake of more than the position holds.
    #[error("cannot unstake {requested}, only {staked} staked")]
    NotEnoughStaked {
        /// Amount requested.
        requested: Decimal,
        /// Amount currently staked.
        staked: Decimal,
    },

    /// The zero account cannot stake or receive.
    #[error("zero account is not a valid staker or recipient")]
    ZeroAccount,

    /// Arithmetic overflow in reward calculation.
    #[error("arithmetic overflow")]
    Overflow,

    /// Caller failed an access precondition.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Authorization deadline has passed.
    #[error("authorization expired at {deadline}, now {now}")]
    AuthorizationExpired {
        /// Signed deadline.
        deadline: Timestamp,
        /// Time of use.
        now: Timestamp,
    },

    /// Authorization nonce is not the owner's next nonce.
    #[error("invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce {
        /// The owner's next nonce.
        expected: u64,
        /// The signed nonce.
        actual: u64,
    },

    /// Authorization was signed for another service.
    #[error("authorization domain does not match this service")]
    WrongDomain,

    /// Authorization was signed for another action.
    #[error("authorization is for {actual:?}, not {expected:?}")]
    WrongAction {
        /// The action being performed.
        expected: AuthorizationAction,
        /// The signed action.
        actual: AuthorizationAction,
    },

    /// The caller is not the authorized spender.
    #[error("caller is not the authorized spender")]
    WrongSpender,

    /// Signature does not verify for the owner.
    #[error("invalid authorization signature")]
    InvalidSignature,

    /// Reward claims are paused by the owner.
    #[error("claim reward paused")]
    ClaimRewardPaused,

    /// The asset cannot be recovered from a service.
    #[error("{0} is not recoverable")]
    InvalidRecoverableAsset(AssetId),

    /// Recovery of more than the service holds in excess.
    #[error("cannot recover {requested}, only {available} recoverable")]
    RecoverableAmountNotEnough {
        /// Amount requested.
        requested: Decimal,
        /// Amount held above what stakers are owed.
        available: Decimal,
    },

    /// Requested amount above the signed amount.
    #[error("requested {requested} exceeds authorized {signed}")]
    AmountExceedsAuthorization {
        /// Amount requested.
        requested: Decimal,
        /// Amount signed.
        signed: Decimal,
    },
}

/// Convenience result type for staking operations.
pub type Result<T> = std::result::Result<T, StakingError>;
