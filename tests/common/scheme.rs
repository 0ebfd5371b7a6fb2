//! [`HashScheme`], a fast stand-in for a real threshold signature scheme.

use chained_hotstuff::types::{
    crypto_primitives::{CryptoHasher, Digest, ThresholdScheme, VerifyingKey},
    data_types::SignatureShare,
    validator_set::ValidatorSet,
};

/// A [`ThresholdScheme`] whose shares are `SHA256(signer || message)`.
///
/// Shares are trivially forgeable, which is fine in tests where every replica follows the protocol's
/// signing rules and the simulated network authenticates senders. Combining and verification use the
/// trait's default quorum logic.
#[derive(Clone)]
pub(crate) struct HashScheme {
    me: VerifyingKey,
    validator_set: ValidatorSet,
}

impl HashScheme {
    pub(crate) fn new(me: VerifyingKey, validator_set: ValidatorSet) -> HashScheme {
        HashScheme { me, validator_set }
    }

    fn share(signer: &VerifyingKey, message: &[u8]) -> SignatureShare {
        let mut hasher = CryptoHasher::new();
        hasher.update(signer.to_bytes());
        hasher.update(message);
        SignatureShare::new(hasher.finalize().to_vec())
    }
}

impl ThresholdScheme for HashScheme {
    fn me(&self) -> VerifyingKey {
        self.me
    }

    fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    fn partial_sign(&self, message: &[u8]) -> SignatureShare {
        Self::share(&self.me, message)
    }

    fn verify_share(&self, signer: &VerifyingKey, message: &[u8], share: &SignatureShare) -> bool {
        Self::share(signer, message) == *share
    }
}
