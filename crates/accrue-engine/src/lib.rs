//! # accrue-engine
//!
//! Composition root for a deployment: one minter, its routers, the staking
//! services they feed and the token ledger they settle against.
//!
//! Every operation runs atomically. A service pulls upstream supply at most
//! once per operation, settles, and hands back a settlement whose transfers
//! the engine executes against the ledger. If any step fails, including a
//! transfer, the whole engine is restored to its state before the call.
//!
//! ## Modules
//!
//! - [`ledger`] — Token balances and the transfer capability
//! - [`supplier`] — Where a service pulls its supply from
//! - [`config`] — TOML deployment configuration
//! - [`engine`] — The engine and its operations

pub mod config;
pub mod engine;
pub mod ledger;
pub mod supplier;

pub use config::EngineConfig;
pub use engine::{Engine, EngineSnapshot, ServiceSnapshot};
pub use ledger::{Balances, Transfer};
pub use supplier::Supplier;

use accrue_emission::EmissionError;
use accrue_router::RouterError;
use accrue_staking::StakingError;
use accrue_types::{AccessError, AccountId, AssetId, Decimal};

/// Error types for engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Emission error.
    #[error("emission: {0}")]
    Emission(#[from] EmissionError),

    /// Staking error.
    #[error("staking: {0}")]
    Staking(#[from] StakingError),

    /// Router error.
    #[error("router: {0}")]
    Router(#[from] RouterError),

    /// Access error.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// No service with this identity.
    #[error("unknown service {0}")]
    UnknownService(AccountId),

    /// No router with this identity.
    #[error("unknown router {0}")]
    UnknownRouter(AccountId),

    /// A router weight names a service that this router does not supply.
    #[error("service {service} is not supplied by router {router}")]
    NotParticipant {
        /// The router.
        router: AccountId,
        /// The service given weight.
        service: AccountId,
    },

    /// The account is a service or router and cannot pull supply directly.
    #[error("{0} is managed by the engine and cannot pull supply directly")]
    ManagedAccount(AccountId),

    /// A token transfer was refused.
    #[error("transfer of {amount} {asset} from {from} to {to} failed")]
    TransferFailed {
        /// Asset being moved.
        asset: AssetId,
        /// Source account.
        from: AccountId,
        /// Destination account.
        to: AccountId,
        /// Amount.
        amount: Decimal,
    },

    /// Invalid deployment configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
