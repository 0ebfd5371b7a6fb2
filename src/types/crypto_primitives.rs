/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Quorum signatures**: the [`ThresholdScheme`] capability, with a default implementation
//!    ([`SignatureSetScheme`]) built on [`ed25519_dalek`] signatures.
//!
//! ## The threshold contract
//!
//! With `k` being the [quorum](crate::types::validator_set::ValidatorSet::quorum) of the validator set:
//! - [`combine`](ThresholdScheme::combine) returns `None` if it is given fewer than `k` valid shares from
//!   distinct validators, and returns `Some` whenever it is given at least `k` of them.
//! - [`verify`](ThresholdScheme::verify) accepts exactly the combined signatures that `combine` can
//!   produce over the same message.
//!
//! The consensus core only ever talks to this trait, so pairing-based schemes with constant-size
//! certificates can be plugged in without touching the protocol code.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    data_types::{CombinedSignature, SignatureShare},
    validator_set::ValidatorSet,
};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// The cryptographic capability the consensus core uses to sign votes and to form and check quorum
/// certificates.
///
/// Each replica owns one instance, created with its own secret key material and the shared validator
/// set.
pub trait ThresholdScheme: Send + 'static {
    /// The verifying key of the replica that owns this instance.
    fn me(&self) -> VerifyingKey;

    /// The validator set whose members may contribute shares.
    fn validator_set(&self) -> &ValidatorSet;

    /// Produce this replica's share of a quorum signature over `message`.
    fn partial_sign(&self, message: &[u8]) -> SignatureShare;

    /// Check that `share` is `signer`'s share over `message`.
    fn verify_share(&self, signer: &VerifyingKey, message: &[u8], share: &SignatureShare) -> bool;

    /// Number of shares from distinct validators required to form a combined signature.
    fn threshold(&self) -> usize {
        self.validator_set().quorum()
    }

    /// Combine `shares` over `message` into a [`CombinedSignature`].
    ///
    /// Shares from non-validators, invalid shares and repeated shares from the same signer are ignored.
    /// Returns `None` if fewer than [`threshold`](Self::threshold) shares remain.
    fn combine(
        &self,
        message: &[u8],
        shares: &[(VerifyingKey, SignatureShare)],
    ) -> Option<CombinedSignature> {
        let validator_set = self.validator_set();
        let mut signature_set = SignatureSet::new(validator_set.len());
        let mut collected = 0;
        for (signer, share) in shares {
            if let Some(pos) = validator_set.position(signer) {
                if signature_set.get(pos).is_none() && self.verify_share(signer, message, share) {
                    signature_set.set(pos, Some(share.clone()));
                    collected += 1;
                }
            }
        }

        if collected < self.threshold() {
            return None;
        }
        signature_set.try_to_vec().ok().map(CombinedSignature::new)
    }

    /// Check that `combined` was formed from at least [`threshold`](Self::threshold) valid shares over
    /// `message`. A combined signature containing any invalid share is rejected.
    fn verify(&self, message: &[u8], combined: &CombinedSignature) -> bool {
        let Ok(signature_set) = SignatureSet::try_from_slice(combined.bytes()) else {
            return false;
        };
        let validator_set = self.validator_set();
        if signature_set.len() != validator_set.len() {
            return false;
        }

        let mut valid = 0;
        for (validator, share) in validator_set.validators().zip(signature_set.iter()) {
            if let Some(share) = share {
                if !self.verify_share(validator, message, share) {
                    return false;
                }
                valid += 1;
            }
        }
        valid >= self.threshold()
    }
}

/// An ordered list of optional [`SignatureShare`]s from the same
/// [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// # Ordering
///
/// If a share was produced by `validator`, it sits at `validator_set.position(validator)`. A `None`
/// at a position means no share from that validator was collected.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureSet(Vec<Option<SignatureShare>>);

impl SignatureSet {
    /// Create a new `SignatureSet` initially containing `len` `None`s.
    pub fn new(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// Get an iterator over the `Option<SignatureShare>`s in this `SignatureSet`.
    pub fn iter(&self) -> std::slice::Iter<'_, Option<SignatureShare>> {
        self.0.iter()
    }

    /// Get a reference to the `Option<SignatureShare>` at position `pos`, or `&None` if `pos` is out of
    /// range.
    pub fn get(&self, pos: usize) -> &Option<SignatureShare> {
        self.0.get(pos).unwrap_or(&None)
    }

    /// Set the value at `pos` in this `SignatureSet` to be `share`. Does nothing if `pos` is out of range.
    pub fn set(&mut self, pos: usize, share: Option<SignatureShare>) {
        if let Some(slot) = self.0.get_mut(pos) {
            *slot = share
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Default [`ThresholdScheme`]: every share is an Ed25519 signature, and a combined signature is a
/// [`SignatureSet`] holding at least a quorum of them.
///
/// Combined signatures produced by this scheme grow linearly with the size of the validator set.
#[derive(Clone)]
pub struct SignatureSetScheme {
    keypair: SigningKey,
    validator_set: ValidatorSet,
}

impl SignatureSetScheme {
    pub fn new(keypair: SigningKey, validator_set: ValidatorSet) -> Self {
        Self {
            keypair,
            validator_set,
        }
    }
}

impl ThresholdScheme for SignatureSetScheme {
    fn me(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    fn partial_sign(&self, message: &[u8]) -> SignatureShare {
        SignatureShare::new(self.keypair.sign(message).to_bytes().to_vec())
    }

    fn verify_share(&self, signer: &VerifyingKey, message: &[u8], share: &SignatureShare) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(share.bytes().as_slice()) else {
            return false;
        };
        signer.verify(message, &Signature::from_bytes(&bytes)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes(n: u8) -> Vec<SignatureSetScheme> {
        let keypairs: Vec<SigningKey> = (0..n)
            .map(|i| SigningKey::from_bytes(&[i + 7; 32]))
            .collect();
        let validator_set =
            ValidatorSet::new(keypairs.iter().map(|k| k.verifying_key()).collect());
        keypairs
            .into_iter()
            .map(|k| SignatureSetScheme::new(k, validator_set.clone()))
            .collect()
    }

    fn shares(
        schemes: &[SignatureSetScheme],
        message: &[u8],
    ) -> Vec<(VerifyingKey, SignatureShare)> {
        schemes
            .iter()
            .map(|s| (s.me(), s.partial_sign(message)))
            .collect()
    }

    #[test]
    fn k_minus_one_shares_do_not_combine() {
        let schemes = schemes(4);
        let message = b"view 3, block x";
        let shares = shares(&schemes, message);
        assert_eq!(schemes[0].threshold(), 3);

        assert!(schemes[0].combine(message, &shares[0..2]).is_none());

        let combined = schemes[0].combine(message, &shares[0..3]).unwrap();
        assert!(schemes[1].verify(message, &combined));
        assert!(!schemes[1].verify(b"another message", &combined));
    }

    #[test]
    fn duplicate_and_invalid_shares_are_not_counted() {
        let schemes = schemes(4);
        let message = b"msg";
        let shares = shares(&schemes, message);

        let duplicated = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert!(schemes[0].combine(message, &duplicated).is_none());

        let mut forged = shares[0..2].to_vec();
        forged.push((shares[2].0, SignatureShare::new(vec![0; 64])));
        assert!(schemes[0].combine(message, &forged).is_none());
    }

    #[test]
    fn forged_signature_set_fails_verification() {
        let schemes = schemes(4);
        let message = b"msg";
        let shares = shares(&schemes, message);

        // Two genuine signatures padded with a garbage third one.
        let mut signature_set = SignatureSet::new(4);
        signature_set.set(0, Some(shares[0].1.clone()));
        signature_set.set(1, Some(shares[1].1.clone()));
        signature_set.set(2, Some(SignatureShare::new(vec![1; 64])));
        let forged = CombinedSignature::new(signature_set.try_to_vec().unwrap());
        assert!(!schemes[3].verify(message, &forged));

        // Two genuine signatures alone.
        signature_set.set(2, None);
        let short = CombinedSignature::new(signature_set.try_to_vec().unwrap());
        assert!(!schemes[3].verify(message, &short));

        assert!(!schemes[3].verify(message, &CombinedSignature::genesis()));
    }
}
