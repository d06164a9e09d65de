//! # accrue-crypto
//!
//! Cryptographic primitives for signed staking authorizations.
//!
//! A staker's [`AccountId`](accrue_types::AccountId) is their Ed25519
//! verifying key. An authorization is a fixed-layout message hashed with a
//! registered BLAKE3 derive-key context and signed by the owner.
//!
//! ## Modules
//!
//! - [`blake3`] — Domain-separated BLAKE3 hashing
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032)

pub mod blake3;
pub mod ed25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Bytes do not encode a valid key.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
