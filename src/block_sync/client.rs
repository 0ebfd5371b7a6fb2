/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Client side of the block sync protocol.
//!
//! [`BlockSyncClient`] holds the state of the sync in progress and validates responses. It never touches
//! the network or the block tree itself: the [`HotStuff`](crate::hotstuff::implementation::HotStuff)
//! state machine sends the requests it produces, and inserts the chains it completes.

use std::time::Instant;

use crate::{
    block_tree::{
        accessors::internal::{BlockTreeError, BlockTreeSingleton},
        pluggables::KVStore,
    },
    hotstuff::messages::Proposal,
    types::{
        block::Block,
        crypto_primitives::ThresholdScheme,
        data_types::{ChainID, CryptoHash},
        validator_set::VerifyingKey,
    },
};

use super::messages::{BlockSyncRequest, BlockSyncResponse};

/// Upper bound on the number of fetched blocks held while the fetched chain is not yet connected to the
/// block tree.
const MAX_STAGED_BLOCKS: usize = 1 << 16;

pub(crate) struct BlockSyncClient {
    chain_id: ChainID,
    request_limit: u32,
    requested: Option<PendingRequest>,
    staged: Vec<Block>,
    pending_proposal: Option<(VerifyingKey, Proposal)>,
}

struct PendingRequest {
    peer: VerifyingKey,
    block: CryptoHash,
    deadline: Instant,
}

/// What became of a sync after a response was processed.
pub(crate) enum SyncProgress {
    /// The response was not the one awaited, and was ignored.
    Ignored,

    /// The response does not chain up to the requested block. The sync was abandoned.
    Rejected { peer: VerifyingKey },

    /// The fetched chain is still not connected to the block tree. The request should be sent to `peer`.
    Continue {
        peer: VerifyingKey,
        request: BlockSyncRequest,
    },

    /// The fetched chain connects to the block tree. `blocks` are the fetched blocks not yet in the
    /// block tree, from the lowest to the highest.
    Complete {
        peer: VerifyingKey,
        blocks: Vec<Block>,
        pending_proposal: Option<(VerifyingKey, Proposal)>,
    },
}

impl BlockSyncClient {
    pub(crate) fn new(chain_id: ChainID, request_limit: u32) -> Self {
        Self {
            chain_id,
            request_limit,
            requested: None,
            staged: Vec::new(),
            pending_proposal: None,
        }
    }

    /// Whether a sync is in progress and has not overrun its deadline.
    pub(crate) fn is_syncing(&self, now: Instant) -> bool {
        self.requested
            .as_ref()
            .is_some_and(|requested| now < requested.deadline)
    }

    /// Start fetching the chain ending at `block` from `peer`, unless another sync is in progress.
    ///
    /// Returns the request to send to `peer`, if a new sync was started.
    pub(crate) fn start_sync(
        &mut self,
        peer: VerifyingKey,
        block: CryptoHash,
        now: Instant,
        deadline: Instant,
    ) -> Option<BlockSyncRequest> {
        if self.is_syncing(now) {
            return None;
        }
        self.clear();
        self.requested = Some(PendingRequest {
            peer,
            block,
            deadline,
        });
        Some(self.request(block))
    }

    /// Remember `proposal` so that it can be processed again once the sync completes. Only the most
    /// recent proposal is remembered.
    pub(crate) fn set_pending_proposal(&mut self, origin: VerifyingKey, proposal: Proposal) {
        if self
            .pending_proposal
            .as_ref()
            .map_or(true, |(_, pending)| pending.view <= proposal.view)
        {
            self.pending_proposal = Some((origin, proposal))
        }
    }

    /// Abandon the sync in progress, if any.
    pub(crate) fn clear(&mut self) {
        self.requested = None;
        self.staged.clear();
        self.pending_proposal = None;
    }

    /// Process a `response` received from `origin`.
    ///
    /// The response is accepted only if it is non-empty, every block in it is correct and extends the
    /// block before it, and its last block is the block that was requested.
    pub(crate) fn on_receive_response<K: KVStore, C: ThresholdScheme>(
        &mut self,
        origin: VerifyingKey,
        response: BlockSyncResponse,
        block_tree: &BlockTreeSingleton<K>,
        scheme: &C,
    ) -> Result<SyncProgress, BlockTreeError> {
        let Some(requested) = &self.requested else {
            return Ok(SyncProgress::Ignored);
        };
        if requested.peer != origin || response.chain_id != self.chain_id {
            return Ok(SyncProgress::Ignored);
        }
        let (peer, requested_block) = (requested.peer, requested.block);

        if !self.is_valid_response(&response, &requested_block, scheme) {
            self.clear();
            return Ok(SyncProgress::Rejected { peer });
        }

        let mut chain = response.blocks;
        chain.append(&mut self.staged);

        let mut first_unknown = None;
        for (i, block) in chain.iter().enumerate() {
            if !block_tree.contains(&block.hash)? {
                first_unknown = Some(i);
                break;
            }
        }
        let blocks = match first_unknown {
            None => Vec::new(),
            Some(i) => chain.split_off(i),
        };
        let connected = match (first_unknown, blocks.first()) {
            (Some(i), Some(lowest)) => {
                i > 0 || lowest.parent.is_zero() || block_tree.contains(&lowest.parent)?
            }
            _ => true,
        };

        if connected {
            let pending_proposal = self.pending_proposal.take();
            self.clear();
            return Ok(SyncProgress::Complete {
                peer,
                blocks,
                pending_proposal,
            });
        }

        if blocks.len() > MAX_STAGED_BLOCKS {
            self.clear();
            return Ok(SyncProgress::Rejected { peer });
        }

        // `blocks` is non-empty here, because an empty `blocks` is always connected.
        let missing = blocks[0].parent;
        self.staged = blocks;
        if let Some(requested) = self.requested.as_mut() {
            requested.block = missing;
        }
        Ok(SyncProgress::Continue {
            peer,
            request: self.request(missing),
        })
    }

    fn request(&self, block: CryptoHash) -> BlockSyncRequest {
        BlockSyncRequest {
            chain_id: self.chain_id,
            block,
            limit: self.request_limit,
        }
    }

    fn is_valid_response<C: ThresholdScheme>(
        &self,
        response: &BlockSyncResponse,
        requested_block: &CryptoHash,
        scheme: &C,
    ) -> bool {
        let Some(last) = response.blocks.last() else {
            return false;
        };
        if last.hash != *requested_block {
            return false;
        }

        let linked = response
            .blocks
            .windows(2)
            .all(|pair| pair[1].parent == pair[0].hash && pair[1].height == pair[0].height + 1);

        linked
            && response.blocks.iter().enumerate().all(|(i, block)| {
                let previous = i.checked_sub(1).map(|i| &response.blocks[i]);
                block.is_correct(self.chain_id, scheme) && block.has_expected_parent(previous)
            })
    }
}
