/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The certificate aggregator, which turns a quorum of [`Vote`]s into a [`QuorumCertificate`].
//!
//! The aggregator never inspects the block tree. It is a signature-counting multimap keyed by
//! `(view, block)`, bounded by [garbage collection](VoteAggregator::gc) of superseded views.
//!
//! Votes reaching the aggregator are expected to have been checked with
//! [`Vote::is_correct`](super::messages::Vote::is_correct) already; invalid signatures are dropped
//! at ingestion by the caller.

use std::collections::{BTreeMap, HashMap};

use crate::types::{
    crypto_primitives::{ThresholdScheme, VerifyingKey},
    data_types::{ChainID, CryptoHash, SignatureShare, VerifyingKeyBytes, ViewNumber},
};

use super::{
    messages::Vote,
    types::{signed_message, QuorumCertificate},
};

/// Two votes from the same signer in the same view for different blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteEquivocation {
    pub view: ViewNumber,
    pub signer: VerifyingKeyBytes,
    pub first: CryptoHash,
    pub second: CryptoHash,
}

/// The shares collected so far for one `(view, block)` pair.
#[derive(Default)]
struct VoteSet {
    shares: Vec<(VerifyingKey, SignatureShare)>,
    completed: bool,
}

pub struct VoteAggregator {
    chain_id: ChainID,
    votes: BTreeMap<(ViewNumber, CryptoHash), VoteSet>,
    // Which block each signer voted for in each view.
    voted: HashMap<(ViewNumber, VerifyingKeyBytes), CryptoHash>,
    equivocations: Vec<VoteEquivocation>,
}

impl VoteAggregator {
    pub fn new(chain_id: ChainID) -> Self {
        Self {
            chain_id,
            votes: BTreeMap::new(),
            voted: HashMap::new(),
            equivocations: Vec::new(),
        }
    }

    /// Add `vote` to the shares collected for `(vote.view, vote.block)`.
    ///
    /// Returns the `QuorumCertificate` for the pair the first time the number of distinct signers reaches
    /// the threshold of `scheme`. Every other call returns `None`, in particular:
    /// - A second vote from the same signer for the same pair is ignored.
    /// - A vote from a signer that already voted for a different block in the same view is not counted,
    ///   and is recorded as a [`VoteEquivocation`].
    /// - Votes for a pair whose certificate has already been returned are ignored.
    pub fn ingest<C: ThresholdScheme>(
        &mut self,
        vote: &Vote,
        scheme: &C,
    ) -> Option<QuorumCertificate> {
        let signer = vote.signer_key()?;

        if let Some(first) = self.voted.get(&(vote.view, vote.signer)) {
            if *first != vote.block {
                self.equivocations.push(VoteEquivocation {
                    view: vote.view,
                    signer: vote.signer,
                    first: *first,
                    second: vote.block,
                });
            }
            return None;
        }
        self.voted.insert((vote.view, vote.signer), vote.block);

        let vote_set = self.votes.entry((vote.view, vote.block)).or_default();
        if vote_set.completed {
            return None;
        }
        vote_set.shares.push((signer, vote.signature.clone()));

        if vote_set.shares.len() < scheme.threshold() {
            return None;
        }
        let message = signed_message(self.chain_id, vote.view, &vote.block);
        let signature = scheme.combine(&message, &vote_set.shares)?;
        vote_set.completed = true;
        vote_set.shares.clear();

        Some(QuorumCertificate {
            view: vote.view,
            block: vote.block,
            signature,
        })
    }

    /// Number of distinct signers collected so far for `(view, block)`, or 0 once its certificate has
    /// been produced.
    pub fn vote_count(&self, view: ViewNumber, block: &CryptoHash) -> usize {
        self.votes
            .get(&(view, *block))
            .map_or(0, |vote_set| vote_set.shares.len())
    }

    /// Take the vote equivocations detected since the last call.
    pub fn take_equivocations(&mut self) -> Vec<VoteEquivocation> {
        std::mem::take(&mut self.equivocations)
    }

    /// Forget everything about views lower than `view`.
    pub fn gc(&mut self, view: ViewNumber) {
        self.votes = self.votes.split_off(&(view, CryptoHash::zero()));
        self.voted.retain(|(v, _), _| *v >= view);
    }
}
