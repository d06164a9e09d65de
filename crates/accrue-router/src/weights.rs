//! Weight map validation.
//!
//! Every weight lies in `(0, 1]` and the weights sum to at most 1. Whatever
//! the weights leave over is not an error: it stays undistributed.

use std::collections::BTreeMap;

use accrue_types::{AccountId, Decimal};

use crate::{Result, RouterError};

/// Validate a weight map and return its sum.
///
/// # Errors
///
/// - [`RouterError::ZeroAccount`] if the zero account has a weight
/// - [`RouterError::InvalidWeight`] if a weight is zero or above 1
/// - [`RouterError::WeightsExceedOne`] if the weights sum above 1
pub fn validate_weights(weights: &BTreeMap<AccountId, Decimal>) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for (account, weight) in weights {
        if account.is_zero() {
            return Err(RouterError::ZeroAccount);
        }
        if weight.is_zero() || *weight > Decimal::ONE {
            return Err(RouterError::InvalidWeight {
                account: *account,
                weight: *weight,
            });
        }
        total = total.checked_add(*weight).ok_or(RouterError::Overflow)?;
    }
    if total > Decimal::ONE {
        return Err(RouterError::WeightsExceedOne(total));
    }
    Ok(total)
}
