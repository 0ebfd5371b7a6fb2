/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the
//! [HotStuff](crate::hotstuff::implementation::HotStuff) protocol.

use std::mem;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    crypto_primitives::{ThresholdScheme, VerifyingKey},
    data_types::{ChainID, CryptoHash, SignatureShare, VerifyingKeyBytes, ViewNumber},
};

use super::types::{signed_message, QuorumCertificate};

/// Messages exchanged by replicas to make progress. Every message carries the view it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum HotStuffMessage {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
}

impl HotStuffMessage {
    /// Returns the chain ID associated with a given `HotStuffMessage`.
    pub fn chain_id(&self) -> ChainID {
        match self {
            HotStuffMessage::Proposal(Proposal { chain_id, .. }) => *chain_id,
            HotStuffMessage::Vote(Vote { chain_id, .. }) => *chain_id,
            HotStuffMessage::NewView(NewView { chain_id, .. }) => *chain_id,
        }
    }

    /// Returns the view number associated with a given `HotStuffMessage`.
    pub fn view(&self) -> ViewNumber {
        match self {
            HotStuffMessage::Proposal(Proposal { view, .. }) => *view,
            HotStuffMessage::Vote(Vote { view, .. }) => *view,
            HotStuffMessage::NewView(NewView { view, .. }) => *view,
        }
    }

    /// Approximate number of bytes the message takes up in memory.
    pub fn size(&self) -> u64 {
        let variable = match self {
            HotStuffMessage::Proposal(proposal) => {
                proposal.block.command.len() + proposal.block.justify.signature.bytes().len()
            }
            HotStuffMessage::Vote(vote) => vote.signature.bytes().len(),
            HotStuffMessage::NewView(new_view) => new_view.high_qc.signature.bytes().len(),
        };
        (mem::size_of::<HotStuffMessage>() + variable) as u64
    }
}

/// Broadcasted by the leader of `view` to propose `block`, whose height must equal `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub chain_id: ChainID,
    pub view: ViewNumber,
    pub block: Block,
}

/// Sent by a replica to the leader of `view + 1` to vote for `block`, proposed in `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub chain_id: ChainID,
    pub view: ViewNumber,
    pub block: CryptoHash,
    pub signer: VerifyingKeyBytes,
    pub signature: SignatureShare,
}

impl Vote {
    /// Create a `Vote` for `block` in `view`, signed by the owner of `scheme`.
    pub fn new<C: ThresholdScheme>(
        scheme: &C,
        chain_id: ChainID,
        view: ViewNumber,
        block: CryptoHash,
    ) -> Vote {
        let signature = scheme.partial_sign(&signed_message(chain_id, view, &block));
        Vote {
            chain_id,
            view,
            block,
            signer: scheme.me().to_bytes(),
            signature,
        }
    }

    /// The signer of the vote, if `signer` is a well-formed verifying key.
    pub fn signer_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signer).ok()
    }

    /// Checks that the signer is a validator and that the signature share is theirs.
    pub fn is_correct<C: ThresholdScheme>(&self, scheme: &C) -> bool {
        match self.signer_key() {
            Some(signer) => {
                scheme.validator_set().contains(&signer)
                    && scheme.verify_share(
                        &signer,
                        &signed_message(self.chain_id, self.view, &self.block),
                        &self.signature,
                    )
            }
            None => false,
        }
    }
}

/// Sent by a replica that has just entered `view` because its previous view timed out, to
/// the leader of `view`, carrying the replica's highest QC.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub chain_id: ChainID,
    pub view: ViewNumber,
    pub high_qc: QuorumCertificate,
}

impl From<Proposal> for HotStuffMessage {
    fn from(proposal: Proposal) -> Self {
        HotStuffMessage::Proposal(proposal)
    }
}

impl From<Vote> for HotStuffMessage {
    fn from(vote: Vote) -> Self {
        HotStuffMessage::Vote(vote)
    }
}

impl From<NewView> for HotStuffMessage {
    fn from(new_view: NewView) -> Self {
        HotStuffMessage::NewView(new_view)
    }
}
