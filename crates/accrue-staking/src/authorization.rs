//! Owner-signed authorizations.
//!
//! An owner signs an [`Authorization`] with their Ed25519 key to let a
//! `spender` stake, unstake or claim on their behalf. The owner's
//! [`AccountId`] is the verifying key, so no key registry is needed.
//!
//! ## Digest
//!
//! ```text
//! digest = BLAKE3-derive-key("Accrue v1 authorization-digest",
//!     multi_field(domain, action, owner, spender, signed_amount, nonce, deadline))
//! ```
//!
//! The domain binds a signature to one service, the nonce makes it single use.

use accrue_crypto::blake3::{self, contexts};
use accrue_crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use accrue_types::{AccountId, Decimal, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{Result, StakingError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationAction {
    Stake,
    Unstake,
    Claim,
}

impl AuthorizationAction {
    fn tag(self) -> u8 {
        match self {
            Self::Stake => 1,
            Self::Unstake => 2,
            Self::Claim => 3,
        }
    }
}

/// The signed message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// The service this authorization is valid for.
    pub domain: [u8; 32],
    pub action: AuthorizationAction,
    pub owner: AccountId,
    pub spender: AccountId,
    /// Upper bound on the amount the spender may move.
    pub signed_amount: Decimal,
    pub nonce: u64,
    pub deadline: Timestamp,
}

impl Authorization {
    /// Domain-separated digest of every field.
    pub fn digest(&self) -> [u8; 32] {
        let action = [self.action.tag()];
        let amount = self.signed_amount.raw().to_le_bytes();
        let nonce = self.nonce.to_le_bytes();
        let deadline = self.deadline.to_le_bytes();
        let encoded = blake3::encode_multi_field(&[
            self.domain.as_slice(),
            &action,
            self.owner.as_bytes(),
            self.spender.as_bytes(),
            &amount,
            &nonce,
            &deadline,
        ]);
        blake3::derive_key(contexts::AUTHORIZATION_DIGEST, &encoded)
    }

    /// Sign with the owner's key.
    pub fn sign(self, key: &SigningKey) -> SignedAuthorization {
        let signature = key.sign(&self.digest());
        SignedAuthorization {
            authorization: self,
            signature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAuthorization {
    pub authorization: Authorization,
    pub signature: Signature,
}

impl SignedAuthorization {
    /// Check the signature against the owner's key.
    ///
    /// # Errors
    ///
    /// - [`StakingError::InvalidSignature`] if the owner is not a valid key or
    ///   the signature does not verify
    pub fn verify_signature(&self) -> Result<()> {
        let key = VerifyingKey::from_account(&self.authorization.owner)
            .map_err(|_| StakingError::InvalidSignature)?;
        key.verify(&self.authorization.digest(), &self.signature)
            .map_err(|_| StakingError::InvalidSignature)
    }
}

/// Authorization domain of the service with identity `service`.
pub fn service_domain(service: AccountId) -> [u8; 32] {
    let encoded = blake3::encode_multi_field(&[b"accrue-staking".as_slice(), service.as_bytes()]);
    blake3::derive_key(contexts::SERVICE_DOMAIN, &encoded)
}
