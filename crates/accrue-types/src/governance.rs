//! Owner and suspension preconditions.
//!
//! Entities that have an operator (the minter, each router, each staking
//! service) embed a [`Governance`] value. Mutating calls pass the caller's
//! identity explicitly and check the precondition they need before touching
//! any state.

use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Access-control failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The caller is not the owner.
    #[error("caller {caller} is not the owner")]
    NotOwner {
        /// The rejected caller.
        caller: AccountId,
    },

    /// The entity is suspended.
    #[error("operation not allowed while suspended")]
    Suspended,

    /// The zero account cannot own anything.
    #[error("zero account cannot be an owner")]
    ZeroOwner,
}

/// Owner identity plus a suspension flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    owner: AccountId,
    #[serde(default)]
    suspended: bool,
}

impl Governance {
    /// Create an active (not suspended) entity owned by `owner`.
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            suspended: false,
        }
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// # Errors
    ///
    /// - [`AccessError::NotOwner`] unless `caller` is the owner
    pub fn require_owner(&self, caller: AccountId) -> Result<(), AccessError> {
        if caller != self.owner || self.owner.is_zero() {
            return Err(AccessError::NotOwner { caller });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// - [`AccessError::Suspended`] if the entity is suspended
    pub fn require_not_suspended(&self) -> Result<(), AccessError> {
        if self.suspended {
            return Err(AccessError::Suspended);
        }
        Ok(())
    }

    /// Hand ownership to `new_owner`. Owner only.
    pub fn transfer_ownership(
        &mut self,
        caller: AccountId,
        new_owner: AccountId,
    ) -> Result<(), AccessError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(AccessError::ZeroOwner);
        }
        tracing::info!(from = %self.owner, to = %new_owner, "ownership transferred");
        self.owner = new_owner;
        Ok(())
    }

    /// Give up ownership for good. Owner-only calls fail afterwards.
    pub fn renounce_ownership(&mut self, caller: AccountId) -> Result<(), AccessError> {
        self.require_owner(caller)?;
        tracing::warn!(owner = %self.owner, "ownership renounced");
        self.owner = AccountId::ZERO;
        Ok(())
    }

    /// Suspend. Owner only.
    pub fn suspend(&mut self, caller: AccountId) -> Result<(), AccessError> {
        self.require_owner(caller)?;
        tracing::warn!("suspended");
        self.suspended = true;
        Ok(())
    }

    /// Lift a suspension. Owner only.
    pub fn resume(&mut self, caller: AccountId) -> Result<(), AccessError> {
        self.require_owner(caller)?;
        tracing::info!("resumed");
        self.suspended = false;
        Ok(())
    }
}
