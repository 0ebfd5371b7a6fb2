/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the [HotStuff](crate::hotstuff::implementation::HotStuff) protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::ThresholdScheme,
    data_types::{ChainID, CombinedSignature, CryptoHash, ViewNumber},
};

/// Proof that at least a quorum of validators have voted for `block` in `view`.
///
/// A `QuorumCertificate` is the only evidence of quorum agreement the protocol trusts. It is required
/// to extend a block, to lock on a block, and to commit one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    pub view: ViewNumber,
    pub block: CryptoHash,
    pub signature: CombinedSignature,
}

impl QuorumCertificate {
    /// Checks whether `signature` is a valid combined signature over
    /// [`signed_message(chain_id, view, block)`](signed_message).
    ///
    /// A special case is if the qc is the genesis qc, in which case it is automatically correct.
    pub fn is_correct<C: ThresholdScheme>(&self, chain_id: ChainID, scheme: &C) -> bool {
        if self.is_genesis_qc() {
            true
        } else {
            scheme.verify(
                &signed_message(chain_id, self.view, &self.block),
                &self.signature,
            )
        }
    }

    /// The certificate every replica starts out with as its locked and highest QC. It certifies the
    /// virtual genesis block (whose hash is all zeroes) at view 0.
    pub const fn genesis_qc() -> QuorumCertificate {
        QuorumCertificate {
            view: ViewNumber::init(),
            block: CryptoHash::zero(),
            signature: CombinedSignature::genesis(),
        }
    }

    pub fn is_genesis_qc(&self) -> bool {
        *self == Self::genesis_qc()
    }
}

/// The bytes a replica signs when it votes for `block` in `view`, and that a
/// [`QuorumCertificate`] for the same pair is verified against.
///
/// This is the Borsh serialization of `(chain_id, view, block)`.
pub fn signed_message(chain_id: ChainID, view: ViewNumber, block: &CryptoHash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(48);
    bytes.extend_from_slice(&chain_id.int().to_le_bytes());
    bytes.extend_from_slice(&view.int().to_le_bytes());
    bytes.extend_from_slice(&block.bytes());
    bytes
}
