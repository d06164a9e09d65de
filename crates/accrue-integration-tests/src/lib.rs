//! Integration test crate for Accrue.
//!
//! This crate has no library code. It only contains integration tests
//! that exercise end-to-end flows across the workspace crates: emission
//! into pools, routing, staking rewards, signed authorizations and
//! persistence.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p accrue-integration-tests
//! ```
