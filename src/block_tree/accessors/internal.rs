/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Internal read-and-write handle used by the algorithm thread to mutate the Block Tree.
//!
//! # Initializing the Block Tree
//!
//! Before anything else is done with the Block Tree, its [replica state](ReplicaState) must be
//! initialized using [`initialize`](BlockTreeSingleton::initialize):
//!
//! |Variable|Initial value|
//! |---|---|
//! |Current View|0|
//! |Locked QC|The [Genesis QC](crate::hotstuff::types::QuorumCertificate::genesis_qc)|
//! |Highest QC|The [Genesis QC](crate::hotstuff::types::QuorumCertificate::genesis_qc)|
//! |Last Voted Height|0|
//! |Leaf Block|The all-zeroes hash of the virtual genesis block|
//!
//! The genesis block itself is never stored. It is the all-zeroes [`CryptoHash`] at height 0, and
//! every block in the tree descends from it.
//!
//! # Mutating the Block Tree directly from user code
//!
//! In normal operation, the algorithm thread makes all writes to the `BlockTreeSingleton`, while users
//! read from the block tree through a [`BlockTreeCamera`](super::public::BlockTreeCamera).
//!
//! Sometimes, however, users may want to manually mutate the Block Tree, for example, to recover from
//! an error that has corrupted some of its invariants. For this purpose, one can unsafe-ly get an
//! instance of `BlockTreeSingleton` using [`BlockTreeSingleton::new_unsafe`].

use std::{sync::mpsc::Sender, time::SystemTime};

use borsh::BorshSerialize;

use crate::{
    events::{CommitBlockEvent, Event, UpdateHighestQCEvent, UpdateLockedQCEvent},
    hotstuff::types::QuorumCertificate,
    types::{
        block::Block,
        data_types::{BlockHeight, ChildrenList, CryptoHash, ViewNumber},
    },
};

use super::super::{
    invariants,
    pluggables::{KVGet, KVGetError, KVStore, Key, WriteBatch},
    replica_state::ReplicaState,
    variables::{self, concat},
};

use super::public::BlockTreeSnapshot;

/// Read and write handle into the block tree that should be owned exclusively by the algorithm thread.
///
/// ## Categories of methods
///
/// Methods are grouped into four categories, each defined in a separate `impl` block:
/// 1. [Lifecycle methods](#impl-BlockTreeSingleton<K>).
/// 2. [Top-level state updaters](#impl-BlockTreeSingleton<K>-1).
/// 3. [Helper functions called by `update`](#impl-BlockTreeSingleton<K>-2).
/// 4. [State getters](#impl-BlockTreeSingleton<K>-3).
pub struct BlockTreeSingleton<K: KVStore>(K);

/// Lifecycle methods.
impl<K: KVStore> BlockTreeSingleton<K> {
    /// Create a new instance of `BlockTreeSingleton` on top of `kv_store`.
    ///
    /// This constructor is private (`pub(crate)`). To create an instance of `BlockTreeSingleton` as a
    /// library user, use [`new_unsafe`](Self::new_unsafe).
    pub(crate) fn new(kv_store: K) -> Self {
        BlockTreeSingleton(kv_store)
    }

    /// Create a new instance of `BlockTreeSingleton` on top of `kv_store`.
    ///
    /// ## Safety
    ///
    /// Read
    /// [mutating the block tree directly from user code](#mutating-the-block-tree-directly-from-user-code).
    pub unsafe fn new_unsafe(kv_store: K) -> Self {
        Self::new(kv_store)
    }

    /// Initialize the replica state to its [genesis values](#initializing-the-block-tree).
    ///
    /// Does nothing if the block tree has already been initialized, so that restarting a replica on top
    /// of an existing store never resets a lock or a cast vote.
    pub fn initialize(&mut self) -> Result<(), BlockTreeError> {
        if self.is_initialized()? {
            return Ok(());
        }
        self.persist_state(&ReplicaState::genesis())
    }

    /// Check whether the replica state has been written into the backing store.
    pub fn is_initialized(&self) -> Result<bool, BlockTreeError> {
        Ok(self.0.get(&variables::CURRENT_VIEW).is_some())
    }

    /// Create a `BlockTreeSnapshot`.
    pub fn snapshot(&self) -> BlockTreeSnapshot<K::Snapshot<'_>> {
        BlockTreeSnapshot::new(self.0.snapshot())
    }

    /// Atomically and durably write the changes in `write_batch` into the `BlockTreeSingleton`.
    pub fn write(
        &mut self,
        write_batch: BlockTreeWriteBatch<K::WriteBatch>,
    ) -> Result<(), BlockTreeError> {
        self.0
            .write(write_batch.0)
            .map_err(|source| BlockTreeError::PersistenceError { source })
    }
}

/// Top-level state updaters.
///
/// These are the methods that mutate the block tree that are called directly by the
/// [`hotstuff`](crate::hotstuff) and [`block_sync`](crate::block_sync) code.
impl<K: KVStore> BlockTreeSingleton<K> {
    /// Append `block` into the block tree and make it the leaf block.
    ///
    /// `append_block` does not call [`update`](Self::update). Calling code is responsible for calling
    /// `update` on `block.justify` afterwards.
    pub fn append_block(&mut self, block: &Block) -> Result<(), BlockTreeError> {
        self.append_blocks(std::slice::from_ref(block))
    }

    /// Append `blocks`, each of which is a child of the previous one or of a block already in the tree,
    /// in a single atomic write. The last block becomes the leaf block.
    pub fn append_blocks(&mut self, blocks: &[Block]) -> Result<(), BlockTreeError> {
        let Some(leaf) = blocks.last() else {
            return Ok(());
        };

        let mut wb = BlockTreeWriteBatch::new();
        let mut pending_children: Vec<(CryptoHash, ChildrenList)> = Vec::new();
        for block in blocks {
            wb.set_block(block)?;

            let index = match pending_children.iter().position(|(p, _)| *p == block.parent) {
                Some(index) => index,
                None => {
                    pending_children.push((block.parent, self.children(&block.parent)?));
                    pending_children.len() - 1
                }
            };
            pending_children[index].1.push(block.hash);
        }
        for (parent, children) in &pending_children {
            wb.set_children(parent, children)?;
        }
        wb.set_leaf_block(&leaf.hash)?;

        self.write(wb)
    }

    /// Load a block from the block tree.
    pub fn load_block(&self, block: &CryptoHash) -> Result<Option<Block>, BlockTreeError> {
        self.block(block)
    }

    /// Durably overwrite every field of [`ReplicaState`] with `state` in a single atomic write.
    ///
    /// The highest committed block is not part of `state`. Only [`commit`](Self::commit) writes it.
    pub fn persist_state(&mut self, state: &ReplicaState) -> Result<(), BlockTreeError> {
        let mut wb = BlockTreeWriteBatch::new();
        wb.set_current_view(state.current_view)?;
        wb.set_locked_qc(&state.locked_qc)?;
        wb.set_highest_qc(&state.high_qc)?;
        wb.set_last_voted_height(state.last_voted_height)?;
        wb.set_leaf_block(&state.leaf)?;
        self.write(wb)
    }

    /// Set the current view to be `view`.
    ///
    /// ## Preconditions
    ///
    /// `view >= self.current_view()`.
    pub fn set_current_view(&mut self, view: ViewNumber) -> Result<(), BlockTreeError> {
        let mut wb = BlockTreeWriteBatch::new();
        wb.set_current_view(view)?;
        self.write(wb)
    }

    /// Update the block tree upon seeing a verified `justify`, either in a
    /// [`Proposal`](crate::hotstuff::messages::Proposal), a
    /// [`NewView`](crate::hotstuff::messages::NewView), or by collecting enough votes.
    ///
    /// ## Updates
    ///
    /// Depending on `justify` and the state of the Block Tree, this function:
    /// 1. Updates the Highest QC if `justify.view > highest_qc.view`.
    /// 2. Updates the Locked QC if appropriate, as determined by [`qc_to_lock`](invariants::qc_to_lock).
    /// 3. Commits a block and all of its uncommitted ancestors if appropriate, as determined by
    ///    [`block_to_commit`](invariants::block_to_commit).
    ///
    /// All three updates are written atomically. Events are published only after the write succeeds.
    ///
    /// ## Return value
    ///
    /// The newly committed blocks, from the lowest to the highest.
    pub(crate) fn update(
        &mut self,
        justify: &QuorumCertificate,
        event_publisher: &Option<Sender<Event>>,
    ) -> Result<Vec<Block>, BlockTreeError> {
        let mut wb = BlockTreeWriteBatch::new();

        let mut update_highest_qc: Option<QuorumCertificate> = None;
        let mut update_locked_qc: Option<QuorumCertificate> = None;
        let mut committed_blocks: Vec<Block> = Vec::new();

        // 1. Update highestQC if needed.
        if justify.view > self.highest_qc()?.view {
            wb.set_highest_qc(justify)?;
            update_highest_qc = Some(justify.clone())
        }

        // 2. Update lockedQC if needed.
        if let Some(new_locked_qc) = invariants::qc_to_lock(justify, self)? {
            wb.set_locked_qc(&new_locked_qc)?;
            update_locked_qc = Some(new_locked_qc)
        }

        // 3. Commit block(s) if needed.
        if let Some(block) = invariants::block_to_commit(justify, self)? {
            committed_blocks = self.commit(&mut wb, &block)?;
        }

        if update_highest_qc.is_none() && update_locked_qc.is_none() && committed_blocks.is_empty() {
            return Ok(committed_blocks);
        }

        self.write(wb)?;

        Self::publish_update_block_tree_events(
            event_publisher,
            update_highest_qc,
            update_locked_qc,
            &committed_blocks,
        );

        Ok(committed_blocks)
    }
}

/// Helper functions called by [`BlockTreeSingleton::update`].
impl<K: KVStore> BlockTreeSingleton<K> {
    /// Commit `block` and all of its ancestors, if they have not already been committed.
    ///
    /// ## Return value
    ///
    /// Returns the newly committed blocks in order from the lowest to the highest.
    ///
    /// ## Errors
    ///
    /// Walking back from `block` must end exactly at the highest committed block (or at genesis, if
    /// nothing has been committed yet). Otherwise `block` conflicts with the committed chain, and a
    /// [`BlockTreeError::ConflictingCommit`] is returned.
    pub fn commit(
        &mut self,
        wb: &mut BlockTreeWriteBatch<K::WriteBatch>,
        block: &CryptoHash,
    ) -> Result<Vec<Block>, BlockTreeError> {
        let highest_committed_block = self.highest_committed_block()?;
        let min_height = self
            .highest_committed_block_height()?
            .unwrap_or(ViewNumber::init());

        // Walk from "block" back to the highest committed block, from newest to oldest.
        let mut uncommitted_blocks: Vec<Block> = Vec::new();
        let mut cursor = *block;
        loop {
            if Some(cursor) == highest_committed_block || cursor.is_zero() {
                break;
            }
            let b = self
                .block(&cursor)?
                .ok_or(BlockTreeError::BlockExpectedButNotFound { block: cursor })?;
            if b.height <= min_height {
                return Err(BlockTreeError::ConflictingCommit { block: *block });
            }
            cursor = b.parent;
            uncommitted_blocks.push(b);
        }
        if cursor.is_zero() && highest_committed_block.is_some() {
            return Err(BlockTreeError::ConflictingCommit { block: *block });
        }

        // Commit from oldest to newest.
        uncommitted_blocks.reverse();
        for b in &uncommitted_blocks {
            wb.set_block_at_height(b.height, &b.hash)?;
        }
        if let Some(highest) = uncommitted_blocks.last() {
            wb.set_highest_committed_block(&highest.hash)?;
        }

        Ok(uncommitted_blocks)
    }

    /// Publish all events resulting from calling [`update`](Self::update) on a block tree. These events
    /// have to do with changing persistent state, and possibly include: `UpdateHighestQC`,
    /// `UpdateLockedQC` and `CommitBlock`.
    ///
    /// Invariant: this method must only be invoked after the associated changes are persistently written to
    /// the [`BlockTreeSingleton`].
    fn publish_update_block_tree_events(
        event_publisher: &Option<Sender<Event>>,
        update_highest_qc: Option<QuorumCertificate>,
        update_locked_qc: Option<QuorumCertificate>,
        committed_blocks: &[Block],
    ) {
        if let Some(highest_qc) = update_highest_qc {
            Event::UpdateHighestQC(UpdateHighestQCEvent {
                timestamp: SystemTime::now(),
                highest_qc,
            })
            .publish(event_publisher)
        };

        if let Some(locked_qc) = update_locked_qc {
            Event::UpdateLockedQC(UpdateLockedQCEvent {
                timestamp: SystemTime::now(),
                locked_qc,
            })
            .publish(event_publisher)
        };

        committed_blocks.iter().for_each(|b| {
            Event::CommitBlock(CommitBlockEvent {
                timestamp: SystemTime::now(),
                block: b.hash,
                height: b.height,
            })
            .publish(event_publisher);
        });
    }
}

/// State getters.
///
/// Each getter calls a corresponding provided method of [`KVGet`] and returns whatever it returns.
/// The same getters are also defined on [`BlockTreeSnapshot`].
impl<K: KVStore> BlockTreeSingleton<K> {
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

    /// Check whether `block` exists on the block tree. The virtual genesis block always does.
    pub fn contains(&self, block: &CryptoHash) -> Result<bool, BlockTreeError> {
        Ok(block.is_zero() || self.0.get(&concat(&variables::BLOCKS, &block.bytes())).is_some())
    }

    /// Get the height of the highest committed block.
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
}

/// Errors that may be encountered when reading or writing to the [`BlockTreeSingleton`].
///
/// Every variant is fatal to the replica: the algorithm thread stops when it encounters one.
#[derive(Debug, thiserror::Error)]
pub enum BlockTreeError {
    /// Error when trying to get a value from the block tree's underlying [key value store][KVStore].
    #[error(transparent)]
    KVGetError(#[from] KVGetError),

    /// Error when trying set a value into block tree's underlying key value store.
    #[error(transparent)]
    KVSetError(#[from] KVSetError),

    /// The underlying key value store failed to durably apply a write batch.
    #[error("failed to persist a write batch")]
    PersistenceError { source: std::io::Error },

    /// Unable to find a block with the specific `CryptoHash`, even though an invariant that the block tree
    /// expects to be maintained suggests that the block should exist.
    #[error("block {block} expected but not found")]
    BlockExpectedButNotFound { block: CryptoHash },

    /// Committing `block` would roll back or fork the committed chain.
    #[error("committing block {block} conflicts with the committed chain")]
    ConflictingCommit { block: CryptoHash },
}

pub struct BlockTreeWriteBatch<W: WriteBatch>(pub(super) W);

impl<W: WriteBatch> BlockTreeWriteBatch<W> {
    pub(crate) fn new() -> BlockTreeWriteBatch<W> {
        BlockTreeWriteBatch(W::new())
    }

    pub fn new_unsafe() -> BlockTreeWriteBatch<W> {
        Self::new()
    }

    /// Serialize `value` and set it at `key_bytes`.
    fn set_value<T: BorshSerialize>(
        &mut self,
        key_bytes: &[u8],
        key: Key,
        value: &T,
    ) -> Result<(), BlockTreeError> {
        let value_bytes = value
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError { key, source: err })?;
        self.0.set(key_bytes, &value_bytes);
        Ok(())
    }

    /* ↓↓↓ Block ↓↓↓  */

    pub fn set_block(&mut self, block: &Block) -> Result<(), BlockTreeError> {
        self.set_value(
            &concat(&variables::BLOCKS, &block.hash.bytes()),
            Key::Block { block: block.hash },
            block,
        )
    }

    /* ↓↓↓ Block at Height ↓↓↓ */

    pub fn set_block_at_height(
        &mut self,
        height: BlockHeight,
        block: &CryptoHash,
    ) -> Result<(), BlockTreeError> {
        self.set_value(
            &concat(&variables::BLOCK_AT_HEIGHT, &height.int().to_le_bytes()),
            Key::BlockAtHeight { height },
            block,
        )
    }

    /* ↓↓↓ Block to Children ↓↓↓ */

    pub fn set_children(
        &mut self,
        block: &CryptoHash,
        children: &ChildrenList,
    ) -> Result<(), BlockTreeError> {
        self.set_value(
            &concat(&variables::BLOCK_TO_CHILDREN, &block.bytes()),
            Key::BlockChildren { block: *block },
            children,
        )
    }

    /* ↓↓↓ Current View ↓↓↓ */

    pub fn set_current_view(&mut self, view: ViewNumber) -> Result<(), BlockTreeError> {
        self.set_value(&variables::CURRENT_VIEW, Key::CurrentView, &view)
    }

    /* ↓↓↓ Locked QC ↓↓↓ */

    pub fn set_locked_qc(&mut self, qc: &QuorumCertificate) -> Result<(), BlockTreeError> {
        self.set_value(&variables::LOCKED_QC, Key::LockedQC, qc)
    }

    /* ↓↓↓ Highest QC ↓↓↓ */

    pub fn set_highest_qc(&mut self, qc: &QuorumCertificate) -> Result<(), BlockTreeError> {
        self.set_value(&variables::HIGHEST_QC, Key::HighestQC, qc)
    }

    /* ↓↓↓ Last Voted Height ↓↓↓ */

    pub fn set_last_voted_height(&mut self, height: BlockHeight) -> Result<(), BlockTreeError> {
        self.set_value(&variables::LAST_VOTED_HEIGHT, Key::LastVotedHeight, &height)
    }

    /* ↓↓↓ Leaf Block ↓↓↓ */

    pub fn set_leaf_block(&mut self, block: &CryptoHash) -> Result<(), BlockTreeError> {
        self.set_value(&variables::LEAF_BLOCK, Key::LeafBlock, block)
    }

    /* ↓↓↓ Highest Committed Block ↓↓↓ */

    pub fn set_highest_committed_block(
        &mut self,
        block: &CryptoHash,
    ) -> Result<(), BlockTreeError> {
        self.set_value(
            &variables::HIGHEST_COMMITTED_BLOCK,
            Key::HighestCommittedBlock,
            block,
        )
    }
}

/// Error when writing a key-value pair to the [write batch][BlockTreeWriteBatch].
/// The error may arise when the value cannot be serialized, and hence cannot be
/// written to the write batch.
#[derive(Debug, thiserror::Error)]
pub enum KVSetError {
    #[error("failed to serialize the value of {key}")]
    SerializeValueError { key: Key, source: std::io::Error },
}
