/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! General purpose, read-only interface for querying the Block Tree.
//!
//! Diagnostic and monitoring code, as well as the [block sync server](crate::block_sync::server), read
//! the block tree concurrently with the algorithm thread through this interface.

use crate::{
    hotstuff::types::QuorumCertificate,
    types::{
        block::Block,
        data_types::{BlockHeight, ChildrenList, CryptoHash, ViewNumber},
    },
};

use super::super::{
    pluggables::{KVGet, KVStore},
    replica_state::ReplicaState,
};

use super::internal::BlockTreeError;

/// A factory for [`BlockTreeSnapshot`]s.
#[derive(Clone)]
pub struct BlockTreeCamera<K: KVStore>(K);

impl<K: KVStore> BlockTreeCamera<K> {
    pub fn new(kv_store: K) -> Self {
        BlockTreeCamera(kv_store)
    }

    pub fn snapshot(&self) -> BlockTreeSnapshot<K::Snapshot<'_>> {
        BlockTreeSnapshot(self.0.snapshot())
    }
}

/// A read-only view into the block tree that is guaranteed to stay unchanged.
pub struct BlockTreeSnapshot<S: KVGet>(pub(super) S);

impl<S: KVGet> BlockTreeSnapshot<S> {
    pub(crate) fn new(kv_snapshot: S) -> Self {
        BlockTreeSnapshot(kv_snapshot)
    }

    /* ↓↓↓ Used for syncing ↓↓↓ */

    /// Get the chain of at most `limit` blocks that ends at `block`, walking parent links back towards
    /// genesis.
    ///
    /// The returned chain goes from the lowest block to `block`. It is empty if `block` is not in the
    /// block tree.
    pub fn chain_ending_at(
        &self,
        block: &CryptoHash,
        limit: u32,
    ) -> Result<Vec<Block>, BlockTreeError> {
        let mut res = Vec::new();
        let mut cursor = *block;
        while res.len() < limit as usize && !cursor.is_zero() {
            match self.0.block(&cursor)? {
                Some(block) => {
                    cursor = block.parent;
                    res.push(block);
                }
                None => break,
            }
        }
        res.reverse();
        Ok(res)
    }

    /// Get every committed block, from the lowest to the highest.
    pub fn committed_chain(&self) -> Result<Vec<Block>, BlockTreeError> {
        let mut res = Vec::new();
        let mut height = ViewNumber::new(1);
        while let Some(block_hash) = self.0.block_at_height(height)? {
            res.push(
                self.0
                    .block(&block_hash)?
                    .ok_or(BlockTreeError::BlockExpectedButNotFound { block: block_hash })?,
            );
            height += 1;
        }
        Ok(res)
    }

    pub fn highest_committed_block_height(&self) -> Result<Option<BlockHeight>, BlockTreeError> {
        match self.highest_committed_block()? {
            Some(block) => Ok(Some(
                self.block(&block)?
                    .ok_or(BlockTreeError::BlockExpectedButNotFound { block })?
                    .height,
            )),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Basic state getters ↓↓↓ */

    pub fn block(&self, block: &CryptoHash) -> Result<Option<Block>, BlockTreeError> {
        Ok(self.0.block(block)?)
    }

    pub fn block_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<CryptoHash>, BlockTreeError> {
        Ok(self.0.block_at_height(height)?)
    }

    pub fn children(&self, block: &CryptoHash) -> Result<ChildrenList, BlockTreeError> {
        Ok(self.0.children(block)?)
    }

    pub fn current_view(&self) -> Result<ViewNumber, BlockTreeError> {
        Ok(self.0.current_view()?)
    }

    pub fn locked_qc(&self) -> Result<QuorumCertificate, BlockTreeError> {
        Ok(self.0.locked_qc()?)
    }

    pub fn highest_qc(&self) -> Result<QuorumCertificate, BlockTreeError> {
        Ok(self.0.highest_qc()?)
    }

    pub fn last_voted_height(&self) -> Result<BlockHeight, BlockTreeError> {
        Ok(self.0.last_voted_height()?)
    }

    pub fn leaf_block(&self) -> Result<CryptoHash, BlockTreeError> {
        Ok(self.0.leaf_block()?)
    }

    pub fn highest_committed_block(&self) -> Result<Option<CryptoHash>, BlockTreeError> {
        Ok(self.0.highest_committed_block()?)
    }

    pub fn replica_state(&self) -> Result<ReplicaState, BlockTreeError> {
        Ok(self.0.replica_state()?)
    }
}
