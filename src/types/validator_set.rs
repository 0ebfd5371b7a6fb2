/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fixed, ordered set of replicas that drive consensus.

use std::slice;

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::SignatureError;

use super::data_types::VerifyingKeyBytes;

pub use ed25519_dalek::{SigningKey, VerifyingKey};

/// Stores the identities of validators in the order they were configured in.
///
/// ## Ordering of validators
///
/// The order matters: the [leader schedule](crate::pacemaker::implementation::select_leader) indexes
/// into it, and [signature sets](super::crypto_primitives::SignatureSetScheme) store each validator's
/// share at the validator's [`position`](Self::position). Every replica must therefore be configured
/// with the same validators in the same order.
///
/// ## Fault tolerance
///
/// A set of `n` validators tolerates `f = (n - 1) / 3` Byzantine validators, and a quorum is
/// `n - f` validators (`2f + 1` when `n = 3f + 1`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<VerifyingKey>,
}

impl ValidatorSet {
    /// Create a validator set from `validators`, dropping any duplicates while keeping the first
    /// occurrence's position.
    pub fn new(validators: Vec<VerifyingKey>) -> ValidatorSet {
        let mut deduplicated: Vec<VerifyingKey> = Vec::with_capacity(validators.len());
        for validator in validators {
            if !deduplicated.contains(&validator) {
                deduplicated.push(validator)
            }
        }
        Self {
            validators: deduplicated,
        }
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.validators.contains(validator)
    }

    /// Get an iterator through validators' verifying keys in configured order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get the validator at `pos`.
    pub fn get(&self, pos: usize) -> Option<&VerifyingKey> {
        self.validators.get(pos)
    }

    /// Get the position of `validator` in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        self.validators.iter().position(|v| v == validator)
    }

    /// Get the position of the validator whose verifying key serializes to `validator`.
    pub fn position_of_bytes(&self, validator: &VerifyingKeyBytes) -> Option<usize> {
        self.validators
            .iter()
            .position(|v| v.as_bytes() == validator)
    }

    /// Get the number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Maximum number of Byzantine validators this validator set tolerates.
    pub fn max_faulty(&self) -> usize {
        self.validators.len().saturating_sub(1) / 3
    }

    /// Number of distinct validators whose signatures make up a quorum.
    pub fn quorum(&self) -> usize {
        self.validators.len() - self.max_faulty()
    }
}

/// Intermediate representation of [`ValidatorSet`] for safe serialization and deserialization.
///
/// To serialize an instance of `ValidatorSet`, convert it into a `ValidatorSetBytes` using
/// `ValidatorSetBytes::from(validator_set)`. To deserialize, use `ValidatorSet::try_from`, which
/// fails if any of the bytes is not a valid Ed25519 verifying key.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorSetBytes(Vec<VerifyingKeyBytes>);

impl From<&ValidatorSet> for ValidatorSetBytes {
    fn from(validator_set: &ValidatorSet) -> Self {
        Self(validator_set.validators().map(|v| v.to_bytes()).collect())
    }
}

impl TryFrom<ValidatorSetBytes> for ValidatorSet {
    type Error = SignatureError;

    fn try_from(value: ValidatorSetBytes) -> Result<Self, Self::Error> {
        let validators = value
            .0
            .iter()
            .map(VerifyingKey::from_bytes)
            .collect::<Result<Vec<VerifyingKey>, SignatureError>>()?;
        Ok(ValidatorSet::new(validators))
    }
}
