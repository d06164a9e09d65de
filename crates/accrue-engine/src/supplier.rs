//! Where a staking service pulls its supply from.

use accrue_types::AccountId;
use serde::{Deserialize, Serialize};

/// Upstream source of a service.
///
/// With [`Supplier::Pool`] the service owns a minter pool and drains it
/// directly. With [`Supplier::Router`] the service is a participant of the
/// router with that identity, and the router owns the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Supplier {
    Pool,
    Router(AccountId),
}

impl Supplier {
    pub fn router(&self) -> Option<AccountId> {
        match self {
            Self::Pool => None,
            Self::Router(router) => Some(*router),
        }
    }
}
