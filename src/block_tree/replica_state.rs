/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The small set of scalars each replica must never forget across restarts.

use crate::{
    hotstuff::types::QuorumCertificate,
    types::data_types::{BlockHeight, CryptoHash, ViewNumber},
};

/// Per-replica protocol state, mutated only by the replica's own
/// [`HotStuff`](crate::hotstuff::implementation::HotStuff) instance.
///
/// ## Invariants
///
/// - `locked_qc.view` never decreases.
/// - `last_voted_height` strictly increases with every vote the replica casts.
/// - `current_view` never decreases.
///
/// The state is durably persisted with
/// [`persist_state`](super::accessors::internal::BlockTreeSingleton::persist_state) before any vote or
/// proposal that depends on it leaves the replica, so that a crash-restart never forgets a lock or a
/// cast vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaState {
    pub current_view: ViewNumber,
    pub locked_qc: QuorumCertificate,
    pub high_qc: QuorumCertificate,
    pub last_voted_height: BlockHeight,
    pub leaf: CryptoHash,
}

impl ReplicaState {
    /// The state of a replica that has not yet taken part in consensus.
    pub fn genesis() -> Self {
        Self {
            current_view: ViewNumber::init(),
            locked_qc: QuorumCertificate::genesis_qc(),
            high_qc: QuorumCertificate::genesis_qc(),
            last_voted_height: ViewNumber::init(),
            leaf: CryptoHash::zero(),
        }
    }
}
