//! # accrue-types
//!
//! Shared domain types used across the Accrue workspace.
//!
//! ## Modules
//!
//! - [`decimal`] — 18-digit fixed-point [`Decimal`] used for every amount, rate and share
//! - [`account`] — Account, asset and pool identities
//! - [`governance`] — Owner and suspension preconditions carried by mutable entities

pub mod account;
pub mod decimal;
pub mod governance;

pub use account::{AccountId, AssetId, PoolId};
pub use decimal::{Decimal, ParseDecimalError};
pub use governance::{AccessError, Governance};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Seconds in one day.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Seconds in one week.
pub const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;
